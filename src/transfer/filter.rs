use anyhow::{Context, Result};
use regex::Regex;

/// Pre-dispatch predicate applied uniformly, in listing order, to every
/// enumerated key. Keys it rejects never become tasks.
#[derive(Debug, Clone)]
pub struct KeyFilter {
    /// Skip keys ending in `/` (folder placeholder objects).
    pub skip_dir_markers: bool,
    pub suffix: Option<String>,
    pub pattern: Option<Regex>,
}

impl Default for KeyFilter {
    fn default() -> Self {
        Self { skip_dir_markers: true, suffix: None, pattern: None }
    }
}

impl KeyFilter {
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        let re = Regex::new(pattern).with_context(|| format!("invalid key pattern: {}", pattern))?;
        self.pattern = Some(re);
        Ok(self)
    }

    pub fn keep_dir_markers(mut self) -> Self {
        self.skip_dir_markers = false;
        self
    }

    pub fn accepts(&self, key: &str) -> bool {
        if self.skip_dir_markers && key.ends_with('/') {
            return false;
        }
        if let Some(sfx) = &self.suffix
            && !key.ends_with(sfx.as_str())
        {
            return false;
        }
        match &self.pattern {
            Some(re) => re.is_match(key),
            None => true,
        }
    }
}
