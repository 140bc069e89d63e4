//! Categorical encoding of team names into dense, 1-based integer identifiers.
//!
//! Labels are ordered by [`str`]'s [`Ord`], which compares the UTF-8 bytes and therefore
//! orders by Unicode scalar value. No locale-aware collation or normalisation is applied, so
//! `"Ölfus"` sorts after `"Zwolle"`.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Index;

/// A bijection from distinct labels onto `1..=N`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Encoding {
    label_to_id: BTreeMap<String, u32>,
}
impl Encoding {
    pub fn id_of(&self, label: &str) -> Option<u32> {
        self.label_to_id.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.label_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.label_to_id.is_empty()
    }

    /// Iterates over `(label, id)` pairs in ascending order of both.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.label_to_id
            .iter()
            .map(|(label, &id)| (label.as_str(), id))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.label_to_id.keys().map(String::as_str)
    }

    pub fn inverse(&self) -> Decoding {
        let mut id_to_label = vec![String::new(); self.label_to_id.len()];
        for (label, &id) in &self.label_to_id {
            id_to_label[id as usize - 1] = label.clone();
        }
        Decoding { id_to_label }
    }
}

impl Index<&str> for Encoding {
    type Output = u32;

    fn index(&self, label: &str) -> &Self::Output {
        self.label_to_id
            .get(label)
            .unwrap_or_else(|| panic!("no identifier for label '{label}'"))
    }
}

/// The inverse of an [`Encoding`]: identifier to label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoding {
    id_to_label: Vec<String>,
}
impl Decoding {
    pub fn label_of(&self, id: u32) -> Option<&str> {
        if id == 0 {
            return None;
        }
        self.id_to_label.get(id as usize - 1).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.id_to_label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_label.is_empty()
    }
}

/// Assigns identifiers to the distinct `labels`, numbering them from 1 in sorted order. The
/// result depends only on the set of distinct labels, not on their order or multiplicity.
pub fn encode<I, S>(labels: I) -> Encoding
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let distinct = labels
        .into_iter()
        .map(|label| label.as_ref().to_string())
        .collect::<BTreeSet<_>>();
    let label_to_id = distinct
        .into_iter()
        .zip(1..)
        .collect::<BTreeMap<_, _>>();
    Encoding { label_to_id }
}
