//! Path templates compiled to anchored regexes.
//!
//! Segments are literals, `:name` parameters, or a trailing `*` wildcard that
//! captures the remainder under the `*` key.

use regex::Regex;
use std::collections::HashMap;

pub const WILDCARD: &str = "*";

#[derive(Clone, Debug)]
pub struct PathPattern {
    raw: String,
    regex: Regex,
    params: Vec<String>,
    literal_prefix: usize,
}

impl PathPattern {
    pub fn parse(template: &str) -> Result<Self, String> {
        if !template.starts_with('/') {
            return Err(format!("path '{}' must start with '/'", template));
        }
        let segments: Vec<&str> = template.split('/').filter(|s| !s.is_empty()).collect();
        let mut expr = String::from("^");
        let mut params = Vec::new();
        let mut literal_prefix = 0;
        let mut literal_run = true;
        let mut wildcard = false;

        for (i, seg) in segments.iter().enumerate() {
            if let Some(name) = seg.strip_prefix(':') {
                if name.is_empty() {
                    return Err(format!("path '{}' has an unnamed parameter", template));
                }
                if params.iter().any(|p| p == name) {
                    return Err(format!("path '{}' repeats parameter '{}'", template, name));
                }
                params.push(name.to_string());
                expr.push_str("/([^/]+)");
                literal_run = false;
            } else if *seg == WILDCARD {
                if i + 1 != segments.len() {
                    return Err(format!("path '{}' has a wildcard before its end", template));
                }
                params.push(WILDCARD.to_string());
                expr.push_str("(?:/(.*))?");
                literal_run = false;
                wildcard = true;
            } else {
                expr.push('/');
                expr.push_str(&regex::escape(seg));
                if literal_run {
                    literal_prefix += 1;
                }
            }
        }
        if !wildcard {
            expr.push_str("/?");
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| e.to_string())?;
        Ok(PathPattern {
            raw: template.to_string(),
            regex,
            params,
            literal_prefix,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of leading literal segments before the first parameter or wildcard.
    pub fn literal_prefix(&self) -> usize {
        self.literal_prefix
    }

    pub fn param_names(&self) -> &[String] {
        &self.params
    }

    /// Returns captured parameters when `path` matches.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let caps = self.regex.captures(path)?;
        let mut out = HashMap::with_capacity(self.params.len());
        for (i, name) in self.params.iter().enumerate() {
            let value = caps.get(i + 1).map(|m| m.as_str()).unwrap_or("");
            out.insert(name.clone(), value.to_string());
        }
        Some(out)
    }
}
