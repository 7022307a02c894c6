//! Acknowledgment reactions sent before a command runs.

use std::collections::HashMap;

use crate::command_registry::normalize_command_name;

/// Command name to acknowledgment glyph. Kept apart from the registry so a
/// command can exist without a reaction.
#[derive(Debug, Clone, Default)]
pub struct ReactionTable {
    glyphs: HashMap<String, String>,
}

impl ReactionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, command: &str, glyph: impl Into<String>) {
        self.glyphs
            .insert(normalize_command_name(command), glyph.into());
    }

    pub fn glyph_for(&self, command: &str) -> Option<&str> {
        self.glyphs
            .get(&normalize_command_name(command))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
}

impl<S, G> FromIterator<(S, G)> for ReactionTable
where
    S: AsRef<str>,
    G: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (S, G)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (command, glyph) in iter {
            table.insert(command.as_ref(), glyph);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::ReactionTable;

    #[test]
    fn unit_glyph_lookup_is_case_insensitive_and_optional() {
        let table = ReactionTable::from_iter([("Ping", "🏓")]);
        assert_eq!(table.glyph_for("PING"), Some("🏓"));
        assert_eq!(table.glyph_for("menu"), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn regression_non_ascii_names_fold_like_the_registry() {
        let table = ReactionTable::from_iter([("ÉCHO", "🔊")]);
        assert_eq!(table.glyph_for("écho"), Some("🔊"));
    }
}
