use std::collections::HashMap;

use crate::common::GroupRecord;
use crate::error::ChatError;
use crate::network::topics;
use crate::state::sessions::RequestOutcome;

/// One pending request to join a group, held by the group's leader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupJoinRequest {
    pub sender: String,
    pub group_name: String,
    pub received_at: i64,
}

/// Local mirror of the retained per-group records plus the leader-side
/// join-request list.
///
/// Writes go through `create` and `add_member`, which mutate the mirror
/// optimistically and hand the full record back for a retained re-publish.
/// The retained echo then lands in `update_local` as an idempotent upsert.
/// Concurrent adds by two leaders resolve last-writer-wins at the broker's
/// retained layer; one of the edits can be lost. Known limitation.
#[derive(Debug)]
pub struct GroupRegistry {
    self_id: String,
    groups: HashMap<String, GroupRecord>,
    order: Vec<String>,
    join_requests: Vec<GroupJoinRequest>,
}

impl GroupRegistry {
    pub fn new(self_id: impl Into<String>) -> Self {
        Self {
            self_id: self_id.into(),
            groups: HashMap::new(),
            order: Vec::new(),
            join_requests: Vec::new(),
        }
    }

    /// Create a group led by us with ourselves as the only member.
    ///
    /// Group names become the `GROUPS/<name>` topic segment, so they must
    /// be non-empty and free of whitespace and topic metacharacters; a `/`
    /// would push the record below the level the `GROUPS/+` subscribers
    /// watch. Creation only checks the local mirror, so two peers racing
    /// to create the same name remains possible; the retained layer then
    /// keeps whichever record was published last.
    pub fn create(&mut self, name: &str) -> Result<GroupRecord, ChatError> {
        if !topics::is_topic_safe(name) {
            return Err(ChatError::InvalidName(format!(
                "group names must be non-empty, without whitespace or /+# (got '{name}')"
            )));
        }
        if self.groups.contains_key(name) {
            return Err(ChatError::AlreadyExists(name.to_string()));
        }

        let record = GroupRecord {
            group_name: name.to_string(),
            leader: self.self_id.clone(),
            members: vec![self.self_id.clone()],
        };
        self.upsert(record.clone());
        Ok(record)
    }

    /// Idempotent upsert from the group topic namespace. Invalid records
    /// are dropped.
    pub fn update_local(&mut self, record: GroupRecord) {
        if !record.is_valid() {
            log::warn!("Dropping invalid group record for '{}'", record.group_name);
            return;
        }
        self.upsert(record);
    }

    fn upsert(&mut self, record: GroupRecord) {
        if !self.groups.contains_key(&record.group_name) {
            self.order.push(record.group_name.clone());
        }
        self.groups.insert(record.group_name.clone(), record);
    }

    pub fn get(&self, name: &str) -> Option<&GroupRecord> {
        self.groups.get(name)
    }

    /// Mirrored groups in insertion order.
    pub fn list(&self) -> impl Iterator<Item = &GroupRecord> + '_ {
        self.order.iter().filter_map(|name| self.groups.get(name))
    }

    /// Leader of `name`, for routing a join request to its control channel.
    pub fn leader_of(&self, name: &str) -> Result<&str, ChatError> {
        self.groups
            .get(name)
            .map(|g| g.leader.as_str())
            .ok_or_else(|| ChatError::UnknownGroup(name.to_string()))
    }

    /// Record an inbound join request. Same de-duplication policy as chat
    /// requests: one live entry per (sender, group), refreshed in place.
    pub fn record_join_request(
        &mut self,
        sender: &str,
        group_name: &str,
        now_millis: i64,
    ) -> RequestOutcome {
        if let Some(existing) = self
            .join_requests
            .iter_mut()
            .find(|r| r.sender == sender && r.group_name == group_name)
        {
            existing.received_at = now_millis;
            return RequestOutcome::Refreshed;
        }
        self.join_requests.push(GroupJoinRequest {
            sender: sender.to_string(),
            group_name: group_name.to_string(),
            received_at: now_millis,
        });
        RequestOutcome::New
    }

    pub fn join_requests(&self) -> &[GroupJoinRequest] {
        &self.join_requests
    }

    /// Remove and return the join request at `index` (1-based, as listed).
    pub fn take_join_request(&mut self, index: usize) -> Result<GroupJoinRequest, ChatError> {
        if index == 0 || index > self.join_requests.len() {
            return Err(ChatError::SelectionOutOfRange {
                index,
                len: self.join_requests.len(),
            });
        }
        Ok(self.join_requests.remove(index - 1))
    }

    /// Append `member` to a group we lead and return the full record for a
    /// retained re-publish.
    ///
    /// The leader check is local; the reference protocol leaves group
    /// mutation unauthenticated, so this guards our own console, not the
    /// wire.
    pub fn add_member(&mut self, name: &str, member: &str) -> Result<GroupRecord, ChatError> {
        let group = self
            .groups
            .get_mut(name)
            .ok_or_else(|| ChatError::UnknownGroup(name.to_string()))?;

        if group.leader != self.self_id {
            return Err(ChatError::NotLeader {
                group: name.to_string(),
                leader: group.leader.clone(),
            });
        }
        if group.is_member(member) {
            return Err(ChatError::DuplicateState(format!(
                "'{member}' is already a member of '{name}'"
            )));
        }

        group.members.push(member.to_string());
        Ok(group.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_validates_the_name() {
        let mut registry = GroupRegistry::new("alice");
        assert!(matches!(
            registry.create(""),
            Err(ChatError::InvalidName(_))
        ));
        assert!(matches!(
            registry.create("a b"),
            Err(ChatError::InvalidName(_))
        ));
        assert_eq!(registry.list().count(), 0);
    }

    #[test]
    fn create_rejects_topic_metacharacters() {
        // 'a/b' would land on GROUPS/a/b, one level below what GROUPS/+
        // subscribers receive; '+' and '#' are illegal in publish topics.
        let mut registry = GroupRegistry::new("alice");
        for name in ["a/b", "a+", "#", "devs/inner"] {
            assert!(
                matches!(registry.create(name), Err(ChatError::InvalidName(_))),
                "{name} should be rejected"
            );
        }
        assert_eq!(registry.list().count(), 0);
    }

    #[test]
    fn create_sets_leader_as_sole_member() {
        let mut registry = GroupRegistry::new("alice");
        let record = registry.create("devs").unwrap();
        assert_eq!(record.leader, "alice");
        assert_eq!(record.members, vec!["alice"]);
        // Mirror is updated at publish time.
        assert!(registry.get("devs").is_some());
    }

    #[test]
    fn create_rejects_mirrored_names() {
        let mut registry = GroupRegistry::new("alice");
        registry.create("devs").unwrap();
        assert!(matches!(
            registry.create("devs"),
            Err(ChatError::AlreadyExists(_))
        ));
    }

    #[test]
    fn update_local_is_idempotent() {
        let mut registry = GroupRegistry::new("carol");
        let record = GroupRecord {
            group_name: "devs".into(),
            leader: "alice".into(),
            members: vec!["alice".into(), "bob".into()],
        };
        registry.update_local(record.clone());
        registry.update_local(record.clone());

        assert_eq!(registry.list().count(), 1);
        assert_eq!(registry.get("devs").unwrap().members, record.members);
    }

    #[test]
    fn update_local_drops_invalid_records() {
        let mut registry = GroupRegistry::new("carol");
        registry.update_local(GroupRecord {
            group_name: "devs".into(),
            leader: String::new(),
            members: vec!["alice".into()],
        });
        assert!(registry.get("devs").is_none());
    }

    #[test]
    fn listing_keeps_insertion_order() {
        let mut registry = GroupRegistry::new("alice");
        registry.create("zeta").unwrap();
        registry.create("alpha").unwrap();
        // An update must not move an existing group.
        registry.update_local(GroupRecord {
            group_name: "zeta".into(),
            leader: "alice".into(),
            members: vec!["alice".into(), "bob".into()],
        });

        let names: Vec<&str> = registry.list().map(|g| g.group_name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn add_member_appends_and_returns_the_full_record() {
        let mut registry = GroupRegistry::new("alice");
        registry.create("devs").unwrap();

        let record = registry.add_member("devs", "bob").unwrap();
        assert_eq!(record.members, vec!["alice", "bob"]);

        // Re-adding is a user-visible no-op.
        assert!(matches!(
            registry.add_member("devs", "bob"),
            Err(ChatError::DuplicateState(_))
        ));
        assert_eq!(registry.get("devs").unwrap().members.len(), 2);
    }

    #[test]
    fn add_member_requires_local_leadership() {
        let mut registry = GroupRegistry::new("bob");
        registry.update_local(GroupRecord {
            group_name: "devs".into(),
            leader: "alice".into(),
            members: vec!["alice".into()],
        });

        assert!(matches!(
            registry.add_member("devs", "carol"),
            Err(ChatError::NotLeader { .. })
        ));
        assert!(matches!(
            registry.add_member("nope", "carol"),
            Err(ChatError::UnknownGroup(_))
        ));
    }

    #[test]
    fn join_requests_deduplicate_per_sender_and_group() {
        let mut registry = GroupRegistry::new("alice");
        assert_eq!(
            registry.record_join_request("bob", "devs", 1),
            RequestOutcome::New
        );
        assert_eq!(
            registry.record_join_request("bob", "ops", 2),
            RequestOutcome::New
        );
        assert_eq!(
            registry.record_join_request("bob", "devs", 3),
            RequestOutcome::Refreshed
        );

        assert_eq!(registry.join_requests().len(), 2);
        assert_eq!(registry.join_requests()[0].received_at, 3);
    }

    #[test]
    fn take_join_request_is_bounds_checked() {
        let mut registry = GroupRegistry::new("alice");
        registry.record_join_request("bob", "devs", 1);

        assert!(registry.take_join_request(2).is_err());
        let request = registry.take_join_request(1).unwrap();
        assert_eq!(request.sender, "bob");
        assert!(registry.join_requests().is_empty());
    }
}
