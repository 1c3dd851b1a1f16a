//! Longest-prefix-first dispatch of statement tokens to decoders.
//!
//! A table holds `(prefix, decoder)` pairs. Resolution picks the entry with
//! the longest prefix that matches the leading tokens of a statement, so a
//! specific option such as `metric-out igp` wins over its parent
//! `metric-out`. Matching is token-wise: `inet` never matches `inet6`.

/// One `(prefix, decoder)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchEntry<D> {
    prefix: Vec<String>,
    decoder: D,
}

impl<D> DispatchEntry<D> {
    /// Returns the keyword tokens matched by this entry.
    #[must_use]
    pub fn prefix(&self) -> &[String] {
        &self.prefix
    }

    /// Returns the decoder attached to this entry.
    #[must_use]
    pub const fn decoder(&self) -> &D {
        &self.decoder
    }
}

/// Declarative dispatch table ordered longest prefix first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchTable<D> {
    entries: Vec<DispatchEntry<D>>,
}

impl<D> Default for DispatchTable<D> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<D> DispatchTable<D> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, keeping the table sorted by descending prefix length.
    ///
    /// Entries of equal length keep their insertion order.
    pub fn insert<I, S>(&mut self, prefix: I, decoder: D)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefix: Vec<String> = prefix.into_iter().map(Into::into).collect();
        let position = self
            .entries
            .iter()
            .position(|entry| entry.prefix.len() < prefix.len())
            .unwrap_or(self.entries.len());
        self.entries
            .insert(position, DispatchEntry { prefix, decoder });
    }

    /// Builder-style variant of [`Self::insert`].
    #[must_use]
    pub fn with<I, S>(mut self, prefix: I, decoder: D) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(prefix, decoder);
        self
    }

    /// Resolves the most specific entry for `tokens`.
    ///
    /// Returns the decoder together with the tokens that follow the matched
    /// prefix, or `None` when no prefix matches.
    #[must_use]
    pub fn resolve<'t>(&self, tokens: &'t [String]) -> Option<(&D, &'t [String])> {
        self.entries.iter().find_map(|entry| {
            if tokens.len() < entry.prefix.len() {
                return None;
            }
            let (head, rest) = tokens.split_at(entry.prefix.len());
            (head == entry.prefix.as_slice()).then_some((&entry.decoder, rest))
        })
    }

    /// Iterates over entries in resolution order.
    pub fn entries(&self) -> impl Iterator<Item = &DispatchEntry<D>> {
        self.entries.iter()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the table holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
