//! # Credential Gate
//!
//! Application-level capability tokens, checked before a request handler
//! runs.
//!
//! ```text
//! required  = Request::REQUIRED_CREDENTIALS        {"admin"}
//! held      = expand(peer tokens, implications)    {"owner", "admin", "moderator"}
//! missing   = required − held                      {}
//! ```
//!
//! Peers start with no tokens. Handlers grant and revoke them.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use courier_shared::{ActorId, Credential};

use crate::config::Implication;

/// The sorted set of tokens one peer holds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CredentialList {
    tokens: BTreeSet<Credential>,
}

impl CredentialList {
    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tokens: BTreeSet::new(),
        }
    }

    /// Adds a token. Returns false if it was already held.
    pub fn grant(&mut self, token: Credential) -> bool {
        self.tokens.insert(token)
    }

    /// Removes a token. Returns false if it was not held.
    pub fn revoke(&mut self, token: &str) -> bool {
        self.tokens.remove(token)
    }

    /// True if the token is held directly (implications not applied).
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }

    /// Tokens in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.tokens.iter()
    }

    /// Number of tokens held directly.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True if no token is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl FromIterator<Credential> for CredentialList {
    fn from_iter<I: IntoIterator<Item = Credential>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}

/// "Holding X also grants Y" pairs, applied transitively.
#[derive(Clone, Debug, Default)]
pub struct ImplicationTable {
    edges: BTreeMap<Credential, Vec<Credential>>,
}

impl ImplicationTable {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            edges: BTreeMap::new(),
        }
    }

    /// Builds a table from configuration pairs.
    #[must_use]
    pub fn from_pairs(pairs: &[Implication]) -> Self {
        let mut table = Self::new();
        for pair in pairs {
            table.insert(pair.token.clone(), pair.implies.clone());
        }
        table
    }

    /// Adds one implication.
    pub fn insert(&mut self, token: Credential, implies: Credential) {
        let targets = self.edges.entry(token).or_default();
        if !targets.contains(&implies) {
            targets.push(implies);
        }
    }

    /// Every token the list holds, directly or through implications.
    ///
    /// Cycles in the table are harmless: each token is visited once.
    #[must_use]
    pub fn expand(&self, held: &CredentialList) -> BTreeSet<Credential> {
        let mut expanded: BTreeSet<Credential> = BTreeSet::new();
        let mut frontier: Vec<&Credential> = held.iter().collect();

        while let Some(token) = frontier.pop() {
            if !expanded.insert(token.clone()) {
                continue;
            }
            if let Some(targets) = self.edges.get(token) {
                frontier.extend(targets.iter());
            }
        }
        expanded
    }

    /// `required − expand(held)`, in `required` order.
    #[must_use]
    pub fn missing(&self, held: &CredentialList, required: &[&str]) -> Vec<Credential> {
        if required.is_empty() {
            return Vec::new();
        }
        let expanded = self.expand(held);
        required
            .iter()
            .filter(|token| !expanded.contains(**token))
            .map(|token| Credential::from(*token))
            .collect()
    }
}

/// Tokens per connected peer.
#[derive(Debug, Default)]
pub struct CredentialStore {
    peers: HashMap<ActorId, CredentialList>,
    implications: ImplicationTable,
}

impl CredentialStore {
    /// Creates an empty store using `implications`.
    #[must_use]
    pub fn new(implications: ImplicationTable) -> Self {
        Self {
            peers: HashMap::new(),
            implications,
        }
    }

    /// Grants a token to a peer. Returns false if already held.
    pub fn grant(&mut self, actor: ActorId, token: Credential) -> bool {
        self.peers.entry(actor).or_default().grant(token)
    }

    /// Revokes a token from a peer. Returns false if not held.
    pub fn revoke(&mut self, actor: ActorId, token: &str) -> bool {
        self.peers
            .get_mut(&actor)
            .is_some_and(|list| list.revoke(token))
    }

    /// The tokens a peer holds directly.
    #[must_use]
    pub fn list(&self, actor: ActorId) -> CredentialList {
        self.peers.get(&actor).cloned().unwrap_or_default()
    }

    /// Tokens `actor` lacks for a request requiring `required`.
    #[must_use]
    pub fn missing(&self, actor: ActorId, required: &[&str]) -> Vec<Credential> {
        if required.is_empty() {
            return Vec::new();
        }
        let empty = CredentialList::new();
        let held = self.peers.get(&actor).unwrap_or(&empty);
        self.implications.missing(held, required)
    }

    /// Forgets everything a peer held.
    pub fn forget(&mut self, actor: ActorId) {
        self.peers.remove(&actor);
    }

    /// Forgets every peer. The implication table is kept.
    pub fn clear(&mut self) {
        self.peers.clear();
    }
}
