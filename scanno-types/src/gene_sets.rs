use anyhow::{format_err, Error};
use std::collections::HashSet;

/// A named gene set. Members are stored in definition order with duplicates
/// removed, so iteration over a set is deterministic.
#[derive(Clone, Debug)]
pub struct GeneSet {
    pub name: String,
    genes: Vec<String>,
}

impl GeneSet {
    pub fn new(name: impl Into<String>, genes: impl IntoIterator<Item = String>) -> GeneSet {
        let mut seen = HashSet::new();
        let genes = genes.into_iter().filter(|g| seen.insert(g.clone())).collect();
        GeneSet {
            name: name.into(),
            genes,
        }
    }

    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn member_set(&self) -> HashSet<&str> {
        self.genes.iter().map(String::as_str).collect()
    }
}

/// An ordered collection of gene sets. Sets may overlap; set names must be
/// unique. Definition order is preserved so downstream score matrices have a
/// deterministic column order.
#[derive(Clone, Debug, Default)]
pub struct GeneSetCollection {
    sets: Vec<GeneSet>,
}

impl GeneSetCollection {
    pub fn new() -> GeneSetCollection {
        GeneSetCollection::default()
    }

    pub fn push(&mut self, set: GeneSet) -> Result<(), Error> {
        if self.sets.iter().any(|s| s.name == set.name) {
            return Err(format_err!("duplicate gene set name {:?}", set.name));
        }
        self.sets.push(set);
        Ok(())
    }

    pub fn sets(&self) -> &[GeneSet] {
        &self.sets
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.sets.iter().map(|s| s.name.clone()).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_dedup_preserves_order() {
        let s = GeneSet::new("cycle", ["b", "a", "b", "c", "a"].map(String::from));
        assert_eq!(s.genes(), &["b".to_string(), "a".to_string(), "c".to_string()]);
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn test_duplicate_set_name_rejected() {
        let mut c = GeneSetCollection::new();
        c.push(GeneSet::new("s", ["a".to_string()])).unwrap();
        assert!(c.push(GeneSet::new("s", ["b".to_string()])).is_err());
        assert_eq!(c.names(), vec!["s".to_string()]);
    }
}
