use std::{
    fs::File,
    io::{self, BufRead},
    path::Path,
};

/// Category names in the order the classifier was trained with.
/// Output index `i` of the model is `CATEGORY_NAMES[i]`.
pub const CATEGORY_NAMES: [&str; 30] = [
    "Aloe Vera",
    "Banana",
    "Bilimbi",
    "Cantaloupe",
    "Cassava",
    "Coconut",
    "Corn",
    "Cucumber",
    "Curcuma",
    "Eggplant",
    "Galangal",
    "Ginger",
    "Guava",
    "Kale",
    "Longbeans",
    "Mango",
    "Melon",
    "Orange",
    "Paddy",
    "Papaya",
    "Peperchili",
    "Pineapple",
    "Pomelo",
    "Shallot",
    "Soybeans",
    "Spinach",
    "Sweetpotatoes",
    "Tobacco",
    "Waterapple",
    "Watermelon",
];

#[derive(Debug, Clone, PartialEq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl LabelSet {
    pub fn builtin() -> Self {
        Self {
            labels: CATEGORY_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// One label per line; blank lines are skipped.
    pub fn from_file(filepath: &Path) -> io::Result<Self> {
        let file = File::open(filepath)?;
        let reader = io::BufReader::new(file);
        let mut labels = Vec::new();

        for line_result in reader.lines() {
            let line = line_result?;
            let label = line.trim();
            if !label.is_empty() {
                labels.push(label.to_string());
            }
        }

        if labels.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("No labels found in {:?}", filepath),
            ));
        }

        Ok(Self { labels })
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_labels_order() {
        let labels = LabelSet::builtin();

        assert_eq!(labels.len(), 30);
        assert_eq!(labels.get(0), Some("Aloe Vera"));
        assert_eq!(labels.get(1), Some("Banana"));
        assert_eq!(labels.get(29), Some("Watermelon"));
        assert_eq!(labels.get(30), None);
    }

    #[test]
    fn test_builtin_labels_are_unique() {
        let mut names: Vec<&str> = CATEGORY_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), CATEGORY_NAMES.len());
    }

    #[test]
    fn test_load_labels_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Apple\n\n  Pear  \nPlum").unwrap();

        let labels = LabelSet::from_file(file.path()).unwrap();

        assert_eq!(labels.labels, vec!["Apple", "Pear", "Plum"]);
    }

    #[test]
    fn test_load_labels_from_empty_file_fails() {
        let file = tempfile::NamedTempFile::new().unwrap();

        let result = LabelSet::from_file(file.path());

        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::InvalidData);
    }
}
