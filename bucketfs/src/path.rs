//! Key model: normalizes a flat store key and decomposes it into
//! name / parent / absolute name. No I/O happens here.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// The sole hierarchy separator of the key space.
pub const SEPARATOR: char = '/';

/// An immutable, normalized store key.
///
/// Equality, ordering and hashing only look at the absolute name, so two
/// paths built through different routes (`from_key("a/b/")` and
/// `root().child("a").child("b")`) are interchangeable.
#[derive(Clone, Debug)]
pub struct Path {
    name: String,
    absolute_name: String,
    /// Raw parent prefix as it appeared in the key, `None` for top-level keys.
    parent: Option<String>,
}

impl Path {
    /// The bucket root. Every empty or separator-only key maps here.
    pub fn root() -> Self {
        Self {
            name: String::new(),
            absolute_name: String::new(),
            parent: None,
        }
    }

    pub fn from_key(key: &str) -> Self {
        let key = normalize(key);
        if key.is_empty() {
            return Self::root();
        }
        match key.rfind(SEPARATOR) {
            None => Self {
                name: key.to_string(),
                absolute_name: key.to_string(),
                parent: None,
            },
            Some(idx) => Self {
                name: key[idx + 1..].to_string(),
                absolute_name: key.to_string(),
                parent: Some(key[..idx + 1].to_string()),
            },
        }
    }

    pub fn is_root(&self) -> bool {
        self.absolute_name.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn absolute_name(&self) -> &str {
        &self.absolute_name
    }

    /// Prefix used to list the entries below this path, `None` for the root
    /// (the root lists the whole bucket).
    pub fn search_prefix(&self) -> Option<String> {
        if self.is_root() {
            return None;
        }
        let mut prefix = String::with_capacity(self.absolute_name.len() + 1);
        prefix.push_str(&self.absolute_name);
        prefix.push(SEPARATOR);
        Some(prefix)
    }

    /// `None` only for the root, which is the traversal ceiling.
    pub fn parent(&self) -> Option<Path> {
        if self.is_root() {
            return None;
        }
        Some(match &self.parent {
            Some(parent) => Path::from_key(parent),
            None => Path::root(),
        })
    }

    pub fn child(&self, name: &str) -> Path {
        if self.is_root() {
            return Path::from_key(name);
        }
        if name.is_empty() || name.contains(SEPARATOR) {
            return Path::from_key(&format!("{}{SEPARATOR}{name}", self.absolute_name));
        }
        Self {
            name: name.to_string(),
            absolute_name: format!("{}{SEPARATOR}{name}", self.absolute_name),
            parent: Some(self.absolute_name.clone()),
        }
    }
}

/// Strips every trailing separator.
fn normalize(key: &str) -> &str {
    let mut key = key;
    while let Some(stripped) = key.strip_suffix(SEPARATOR) {
        key = stripped;
    }
    key
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.absolute_name)
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.absolute_name == other.absolute_name
    }
}

impl Eq for Path {}

impl Hash for Path {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.absolute_name.hash(state);
    }
}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Path {
    fn cmp(&self, other: &Self) -> Ordering {
        self.absolute_name.cmp(&other.absolute_name)
    }
}

impl From<&str> for Path {
    fn from(key: &str) -> Self {
        Path::from_key(key)
    }
}
