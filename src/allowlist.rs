use std::collections::HashSet;

/// Course identifiers an administrator enabled for the mobile functions.
///
/// The persisted setting is a text block with one identifier per line.
/// Carriage returns are dropped before splitting; nothing else is trimmed and
/// comparison is case sensitive. An unset or empty setting enables nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseAllowList {
    ids: HashSet<String>,
}

impl CourseAllowList {
    pub fn parse(setting: Option<&str>) -> Self {
        let ids = match setting {
            Some(text) if !text.is_empty() => text
                .replace('\r', "")
                .split('\n')
                .map(str::to_owned)
                .collect(),
            _ => HashSet::new(),
        };
        Self { ids }
    }

    pub fn contains(&self, courseid: &str) -> bool {
        self.ids.contains(courseid)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
