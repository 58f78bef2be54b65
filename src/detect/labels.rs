use std::borrow::Cow;

/// Default class table, indexed by detector class id.
pub const DEFAULT_CLASS_NAMES: &[&str] = &[
    "face",
    "eye",
    "hand",
    "chest",
    "genital",
    "underwear",
    "armpit",
    "penis",
    "full_body",
    "intercourse",
    "shoe",
    "chest_clothed",
    "genital_clothed",
    "female",
    "male",
];

/// Classes censored when no target set is configured.
pub const DEFAULT_TARGETS: &[&str] = &["face", "chest", "genital", "underwear"];

/// Resolves detector class ids to names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassNames {
    names: Vec<String>,
}

impl ClassNames {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Name for `class_id`; ids past the table resolve to `class-<id>`.
    pub fn resolve(&self, class_id: u32) -> Cow<'_, str> {
        match self.names.get(class_id as usize) {
            Some(name) => Cow::Borrowed(name.as_str()),
            None => Cow::Owned(format!("class-{}", class_id)),
        }
    }

    /// Class id for a name, if the table has it.
    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| idx as u32)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for ClassNames {
    fn default() -> Self {
        Self::new(DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_and_unknown_ids() {
        let names = ClassNames::default();
        assert_eq!(names.resolve(0), "face");
        assert_eq!(names.resolve(3), "chest");
        assert_eq!(names.resolve(99), "class-99");
        assert_eq!(names.id_of("underwear"), Some(5));
        assert_eq!(names.id_of("nope"), None);
    }
}
