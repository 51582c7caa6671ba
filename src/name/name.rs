use smallvec::SmallVec;

/// A domain name stored as lowercased wire-format labels (length byte +
/// bytes, no trailing root byte) plus the byte offset where each label
/// starts, so a `Name` can be sliced into its parents without
/// re-parsing. Comparisons and the canonical sort key both treat names
/// case-insensitively per RFC 4034 §6.1.
#[derive(Clone, Debug, Eq)]
pub struct Name {
    wire: Vec<u8>,
    /// Offsets into `wire` where each label's length byte sits, root-most
    /// label last (i.e. `offsets[0]` is the leftmost/most-specific label).
    offsets: SmallVec<[u16; 8]>,
}

impl Name {
    pub fn root() -> Self {
        Name {
            wire: Vec::new(),
            offsets: SmallVec::new(),
        }
    }

    /// Parses a presentation-format name such as `www.example.com.` (trailing
    /// dot optional). Escaped dots (`\.`) are not supported; the zone core
    /// only needs this for config/test convenience, not zonefile parsing.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim_end_matches('.');
        if trimmed.is_empty() {
            return Name::root();
        }
        let mut wire = Vec::new();
        let mut offsets = SmallVec::new();
        for label in trimmed.split('.') {
            let lower = label.to_ascii_lowercase();
            offsets.push(wire.len() as u16);
            wire.push(lower.len() as u8);
            wire.extend_from_slice(lower.as_bytes());
        }
        Name { wire, offsets }
    }

    pub fn label_count(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_root(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Returns the immediate parent name, or `None` for the root.
    pub fn parent(&self) -> Option<Name> {
        if self.offsets.len() <= 1 {
            return if self.offsets.is_empty() {
                None
            } else {
                Some(Name::root())
            };
        }
        let cut = self.offsets[1] as usize;
        Some(Name {
            wire: self.wire[cut..].to_vec(),
            offsets: self.offsets[1..].iter().map(|o| o - cut as u16).collect(),
        })
    }

    /// True if `self` is equal to or a descendant of `ancestor`.
    pub fn is_subdomain_of(&self, ancestor: &Name) -> bool {
        if ancestor.label_count() > self.label_count() {
            return false;
        }
        let skip = self.label_count() - ancestor.label_count();
        let mut cur = self.clone();
        for _ in 0..skip {
            cur = cur.parent().unwrap_or_else(Name::root);
        }
        cur == *ancestor
    }

    pub fn labels(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.offsets.len());
        for &off in &self.offsets {
            let off = off as usize;
            let len = self.wire[off] as usize;
            let start = off + 1;
            out.push(String::from_utf8_lossy(&self.wire[start..start + len]).to_string());
        }
        out
    }

    /// Canonical-order sort key per RFC 4034 §6.1: compare labels
    /// right-to-left (root-most first), lowercased. We build this by
    /// reversing the label sequence and joining with a 0x00 separator that
    /// cannot appear inside a label (labels are length-prefixed, never
    /// 0x00-containing in our ASCII-only parser), which gives the
    /// `NameTree`'s `BTreeMap` key the property that an ancestor's key is
    /// always a byte-prefix of (and therefore sorts immediately before) all
    /// of its descendants' keys.
    pub fn canonical_key(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.wire.len() + self.offsets.len());
        for &off in self.offsets.iter().rev() {
            let off = off as usize;
            let len = self.wire[off] as usize;
            key.extend_from_slice(&self.wire[off + 1..off + 1 + len]);
            key.push(0);
        }
        key
    }

    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = self.wire.clone();
        out.push(0);
        out
    }

    pub fn to_text(&self) -> String {
        if self.is_root() {
            return ".".to_string();
        }
        format!("{}.", self.labels().join("."))
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_key() == other.canonical_key()
    }
}

impl std::hash::Hash for Name {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.canonical_key().hash(state);
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.canonical_key().cmp(&other.canonical_key())
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_key_orders_apex_before_descendants() {
        let apex = Name::parse("example.com.");
        let child = Name::parse("www.example.com.");
        assert!(apex < child);
        assert!(apex.canonical_key().len() < child.canonical_key().len());
        assert!(child.canonical_key().starts_with(&apex.canonical_key()));
    }

    #[test]
    fn is_subdomain_of_detects_ancestry() {
        let apex = Name::parse("example.com.");
        let child = Name::parse("a.b.example.com.");
        assert!(child.is_subdomain_of(&apex));
        assert!(!apex.is_subdomain_of(&child));
        assert!(apex.is_subdomain_of(&apex));
    }

    #[test]
    fn parent_walks_toward_root() {
        let name = Name::parse("a.b.example.com.");
        let p1 = name.parent().unwrap();
        assert_eq!(p1.to_text(), "b.example.com.");
        let root = Name::parse("com.").parent().unwrap();
        assert!(root.is_root());
    }

    #[test]
    fn comparison_is_case_insensitive() {
        assert_eq!(Name::parse("Example.COM."), Name::parse("example.com."));
    }
}
