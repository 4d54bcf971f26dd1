use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

#[derive(Debug, Default)]
struct State {
    user_ids: HashMap<String, String>,
    groups: HashMap<String, BTreeSet<String>>,
}

/// Username and group-membership lookups, rebuilt in bulk by the precache
/// job and dropped whenever any user or group object changes.
#[derive(Debug, Default)]
pub struct AuthCache {
    state: RwLock<State>,
}

impl AuthCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&self) {
        *self.state.write().expect("lock poisoned") = State::default();
    }

    /// Replace everything with a freshly computed view. Usernames are keyed
    /// case-insensitively.
    pub fn install(&self, user_ids: HashMap<String, String>, groups: HashMap<String, BTreeSet<String>>) {
        let user_ids = user_ids
            .into_iter()
            .map(|(name, id)| (name.to_ascii_lowercase(), id))
            .collect();
        *self.state.write().expect("lock poisoned") = State { user_ids, groups };
    }

    pub fn id_for_username(&self, username: &str) -> Option<String> {
        self.state
            .read()
            .expect("lock poisoned")
            .user_ids
            .get(&username.to_ascii_lowercase())
            .cloned()
    }

    /// All groups `user_id` belongs to, directly or through other groups.
    pub fn groups_for(&self, user_id: &str) -> Option<BTreeSet<String>> {
        self.state.read().expect("lock poisoned").groups.get(user_id).cloned()
    }

    pub fn set_groups_for(&self, user_id: &str, groups: BTreeSet<String>) {
        self.state
            .write()
            .expect("lock poisoned")
            .groups
            .insert(user_id.to_string(), groups);
    }

    pub fn set_id_for_username(&self, username: &str, id: &str) {
        self.state
            .write()
            .expect("lock poisoned")
            .user_ids
            .insert(username.to_ascii_lowercase(), id.to_string());
    }
}

/// Expand direct memberships (member -> groups listing it) into the
/// transitive closure. Cycles terminate.
pub fn recursive_groups(direct: &HashMap<String, BTreeSet<String>>) -> HashMap<String, BTreeSet<String>> {
    direct
        .keys()
        .map(|member| {
            let mut seen = BTreeSet::new();
            let mut stack: Vec<&String> = direct[member].iter().collect();
            while let Some(group) = stack.pop() {
                if group == member || !seen.insert(group.clone()) {
                    continue;
                }
                if let Some(parents) = direct.get(group) {
                    stack.extend(parents.iter());
                }
            }
            (member.clone(), seen)
        })
        .collect()
}
