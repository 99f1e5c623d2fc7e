use regex::Regex;
use std::sync::Arc;

use logforward_types::{ConfigError, Fields, Target};

/// A target with its exclude/multiline patterns compiled once
pub struct CompiledTarget {
    /// Target name, used as the entry sourcetype
    name: String,

    /// Records matching this are dropped
    exclude: Option<Regex>,

    /// Lines matching this start a new record
    multiline: Option<Regex>,

    /// Shared enrichment fields (None when unconfigured)
    fields: Option<Fields>,
}

impl CompiledTarget {
    /// Compile a target's patterns
    pub fn compile(target: &Target) -> Result<Self, ConfigError> {
        let exclude = compile_pattern(target, "exclude_pattern", &target.exclude_pattern)?;
        let multiline = compile_pattern(target, "multiline_pattern", &target.multiline_pattern)?;

        let fields = if target.fields.is_empty() {
            None
        } else {
            Some(Arc::new(target.fields.clone()))
        };

        Ok(Self {
            name: target.name.clone(),
            exclude,
            multiline,
            fields,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if an assembled record should be suppressed
    pub fn is_excluded(&self, text: &str) -> bool {
        match &self.exclude {
            Some(re) => re.is_match(text),
            None => false,
        }
    }

    /// Whether records are aggregated across lines
    pub fn is_multiline(&self) -> bool {
        self.multiline.is_some()
    }

    /// Check if a raw line begins a new multiline record
    pub fn starts_record(&self, line: &str) -> bool {
        match &self.multiline {
            Some(re) => re.is_match(line.trim_end_matches(['\r', '\n'])),
            None => true,
        }
    }

    /// Shared handle to the target's static fields
    pub fn fields(&self) -> Option<Fields> {
        self.fields.clone()
    }
}

impl std::fmt::Debug for CompiledTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledTarget")
            .field("name", &self.name)
            .field("exclude", &self.exclude.as_ref().map(Regex::as_str))
            .field("multiline", &self.multiline.as_ref().map(Regex::as_str))
            .field("fields", &self.fields)
            .finish()
    }
}

fn compile_pattern(
    target: &Target,
    kind: &'static str,
    pattern: &Option<String>,
) -> Result<Option<Regex>, ConfigError> {
    match pattern.as_deref() {
        None | Some("") => Ok(None),
        Some(p) => Regex::new(p)
            .map(Some)
            .map_err(|e| ConfigError::InvalidPattern {
                target: target.name.clone(),
                kind,
                reason: e.to_string(),
            }),
    }
}

/// Compiled targets, indexed like the configured target list.
///
/// Built once at startup and never mutated; every tailer of a target holds
/// the same `Arc`.
#[derive(Debug, Default)]
pub struct RegexCache {
    targets: Vec<Arc<CompiledTarget>>,
}

impl RegexCache {
    /// Compile every target, failing on the first malformed pattern
    pub fn compile(targets: &[Target]) -> Result<Self, ConfigError> {
        let targets = targets
            .iter()
            .map(|t| CompiledTarget::compile(t).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { targets })
    }

    pub fn get(&self, index: usize) -> Option<&Arc<CompiledTarget>> {
        self.targets.get(index)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn target() -> Target {
        Target::new("app", vec!["/var/log/app.log".to_string()])
    }

    #[test]
    fn test_exclude_pattern() {
        let mut t = target();
        t.exclude_pattern = Some("DEBUG".to_string());
        let compiled = CompiledTarget::compile(&t).unwrap();
        assert!(compiled.is_excluded("DEBUG noisy line"));
        assert!(!compiled.is_excluded("INFO useful line"));
    }

    #[test]
    fn test_empty_patterns_are_absent() {
        let mut t = target();
        t.exclude_pattern = Some(String::new());
        t.multiline_pattern = Some(String::new());
        let compiled = CompiledTarget::compile(&t).unwrap();
        assert!(!compiled.is_multiline());
        assert!(!compiled.is_excluded("anything"));
    }

    #[test]
    fn test_multiline_ignores_line_terminator() {
        let mut t = target();
        t.multiline_pattern = Some(r"^\d{4}-\d{2}-\d{2}$".to_string());
        let compiled = CompiledTarget::compile(&t).unwrap();
        assert!(compiled.starts_record("2024-01-15\n"));
        assert!(!compiled.starts_record("  at frame\n"));
    }

    #[test]
    fn test_fields_shared_by_reference() {
        let mut t = target();
        t.fields = BTreeMap::from([("env".to_string(), "prod".to_string())]);
        let compiled = CompiledTarget::compile(&t).unwrap();
        let a = compiled.fields().unwrap();
        let b = compiled.fields().unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let empty = CompiledTarget::compile(&target()).unwrap();
        assert!(empty.fields().is_none());
    }

    #[test]
    fn test_cache_rejects_bad_patterns() {
        let mut bad_exclude = target();
        bad_exclude.exclude_pattern = Some("[".to_string());
        let err = RegexCache::compile(&[bad_exclude]).unwrap_err();
        assert!(err.to_string().contains("invalid exclude_pattern"));

        let mut bad_multiline = target();
        bad_multiline.multiline_pattern = Some("(".to_string());
        let err = RegexCache::compile(&[target(), bad_multiline]).unwrap_err();
        assert!(err.to_string().contains("invalid multiline_pattern"));
    }

    #[test]
    fn test_cache_indexes_targets() {
        let cache = RegexCache::compile(&[target(), Target::new("other", vec![])]).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(1).unwrap().name(), "other");
        assert!(cache.get(2).is_none());
    }
}
