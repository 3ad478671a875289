// src/types.rs

use std::collections::BTreeMap;
use std::fmt;

/// Queue consumed by the implicit default worker.
pub const DEFAULT_QUEUE: &str = "default";

/// Default consumer pool size for a queue worker.
pub const DEFAULT_CONCURRENCY: usize = 8;
/// Default autoscale policy, `"max,min"`.
pub const DEFAULT_AUTOSCALE: &str = "100,1";
/// Default memory ceiling per consumer, in kilobytes.
pub const DEFAULT_MAX_MEMORY_PER_CHILD: u64 = 10_000;

pub const KEY_CONCURRENCY: &str = "concurrency";
pub const KEY_AUTOSCALE: &str = "autoscale";
pub const KEY_MAX_MEMORY_PER_CHILD: &str = "max-memory-per-child";

/// Launch parameters for the worker process consuming one queue.
///
/// Rendered as `--<key> <value>` flags on the worker command line. Keys are
/// kept sorted so the generated supervisor config is stable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkerArgs {
    args: BTreeMap<String, String>,
}

impl WorkerArgs {
    /// Empty set, typically used for caller overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixed defaults every queue worker starts from.
    pub fn defaults() -> Self {
        let mut args = Self::new();
        args.insert(KEY_CONCURRENCY, DEFAULT_CONCURRENCY.to_string());
        args.insert(KEY_AUTOSCALE, DEFAULT_AUTOSCALE);
        args.insert(KEY_MAX_MEMORY_PER_CHILD, DEFAULT_MAX_MEMORY_PER_CHILD.to_string());
        args
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.args.insert(key.into(), value.into());
    }

    /// Builder-style [`WorkerArgs::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.args.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Return `self` with every key of `overrides` replacing ours.
    ///
    /// Neither input is modified.
    pub fn merged(&self, overrides: &WorkerArgs) -> WorkerArgs {
        let mut out = self.clone();
        for (k, v) in overrides.iter() {
            out.insert(k, v);
        }
        out
    }

    /// `--key value` pairs in key order.
    pub fn to_flags(&self) -> Vec<String> {
        self.iter().map(|(k, v)| format!("--{k} {v}")).collect()
    }
}

impl fmt::Display for WorkerArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_flags().join(" "))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for WorkerArgs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut args = WorkerArgs::new();
        for (k, v) in iter {
            args.insert(k, v);
        }
        args
    }
}

/// True when `name` only uses `[A-Za-z0-9_.-]`.
///
/// Workflow names double as queue names, supervisor program names and
/// `--queues` arguments, where `,` and whitespace act as separators.
pub fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Parse an autoscale policy `"max,min"` into `(max, min)`.
pub fn parse_autoscale(s: &str) -> Result<(usize, usize), String> {
    let (max, min) = s
        .split_once(',')
        .ok_or_else(|| format!("invalid autoscale '{s}' (expected \"max,min\")"))?;
    let max: usize = max
        .trim()
        .parse()
        .map_err(|_| format!("invalid autoscale maximum in '{s}'"))?;
    let min: usize = min
        .trim()
        .parse()
        .map_err(|_| format!("invalid autoscale minimum in '{s}'"))?;
    if max < min {
        return Err(format!("autoscale maximum {max} is lower than minimum {min}"));
    }
    Ok((max, min))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_exclude_separators() {
        for good in ["zip", "ftp_send-1", "v1.2"] {
            assert!(is_plain_name(good), "{good}");
        }
        for bad in ["", "a,b", "a b", "a\tb", "a:b", "caf\u{e9}"] {
            assert!(!is_plain_name(bad), "{bad:?}");
        }
    }

    #[test]
    fn defaults_contain_the_three_launch_keys() {
        let d = WorkerArgs::defaults();
        assert_eq!(d.get(KEY_CONCURRENCY), Some("8"));
        assert_eq!(d.get(KEY_AUTOSCALE), Some("100,1"));
        assert_eq!(d.get(KEY_MAX_MEMORY_PER_CHILD), Some("10000"));
    }

    #[test]
    fn merged_leaves_inputs_untouched() {
        let defaults = WorkerArgs::defaults();
        let overrides = WorkerArgs::new().with(KEY_CONCURRENCY, "2");

        let merged = defaults.merged(&overrides);

        assert_eq!(merged.get(KEY_CONCURRENCY), Some("2"));
        assert_eq!(defaults.get(KEY_CONCURRENCY), Some("8"));
        assert_eq!(WorkerArgs::defaults(), defaults);
    }

    #[test]
    fn flags_render_in_key_order() {
        let args = WorkerArgs::new().with("b", "2").with("a", "1");
        assert_eq!(args.to_string(), "--a 1 --b 2");
    }

    #[test]
    fn autoscale_parsing() {
        assert_eq!(parse_autoscale("100,1"), Ok((100, 1)));
        assert_eq!(parse_autoscale(" 4 , 4 "), Ok((4, 4)));
        assert!(parse_autoscale("1,4").is_err());
        assert!(parse_autoscale("4").is_err());
        assert!(parse_autoscale("x,1").is_err());
    }
}
