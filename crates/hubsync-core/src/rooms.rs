// ── Room index ──
//
// Room → member ids collected during a sync pass, then merged into one
// persisted `enum` node per room. Members are only ever added.

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

use crate::store::{ObjectStore, TreeObject};

/// Id prefix of the per-room enumeration nodes.
pub const ROOM_ENUM_PREFIX: &str = "enum.rooms";

/// Store id of the enumeration node for `room` (case-insensitive).
pub fn room_enum_id(room: &str) -> String {
    format!("{ROOM_ENUM_PREFIX}.{}", room.to_lowercase())
}

#[derive(Debug, Default)]
pub struct RoomIndex {
    rooms: IndexMap<String, IndexSet<String>>,
}

/// What a [`RoomIndex::commit`] did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub created: Vec<String>,
    pub extended: Vec<String>,
    pub failed: Vec<String>,
}

impl RoomIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `member` (a full store id) to `room`. Duplicates are ignored.
    pub fn record(&mut self, room: &str, member: impl Into<String>) {
        self.rooms
            .entry(room.to_owned())
            .or_default()
            .insert(member.into());
    }

    pub fn members(&self, room: &str) -> Option<&IndexSet<String>> {
        self.rooms.get(room)
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Merge every recorded room into the store.
    ///
    /// Absent rooms are created with exactly the recorded members; existing
    /// ones gain the members they lack. Committed rooms are cleared from the
    /// index. A room whose read or write fails is kept, together with its
    /// members, and is retried by the next commit along with anything
    /// recorded in between, so a failed pass never drops room membership.
    pub async fn commit<S>(&mut self, store: &S) -> CommitReport
    where
        S: ObjectStore + ?Sized,
    {
        let mut report = CommitReport::default();
        let mut retained = IndexMap::new();

        for (room, members) in std::mem::take(&mut self.rooms) {
            let id = room_enum_id(&room);
            let recorded: Vec<String> = members.iter().cloned().collect();

            let result = match store.get_object(&id).await {
                Ok(None) => store
                    .set_object(&id, TreeObject::room(&room, recorded))
                    .await
                    .map(|()| report.created.push(id.clone())),
                Ok(Some(existing)) => {
                    let missing: Vec<String> = recorded
                        .into_iter()
                        .filter(|m| !existing.common.members.contains(m))
                        .collect();
                    debug!(room = %id, added = missing.len(), "extending room");
                    store
                        .extend_object(&id, TreeObject::room(&room, missing))
                        .await
                        .map(|_| report.extended.push(id.clone()))
                }
                Err(e) => Err(e),
            };

            if let Err(e) = result {
                warn!(room = %id, error = %e, "room commit failed, keeping members for next pass");
                report.failed.push(id);
                retained.insert(room, members);
            }
        }

        self.rooms = retained;
        report
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::store::failing::FailingStore;
    use pretty_assertions::assert_eq;

    #[test]
    fn record_deduplicates() {
        let mut index = RoomIndex::new();
        index.record("Kitchen", "ns.Kitchen.Lamp.Light");
        index.record("Kitchen", "ns.Kitchen.Lamp.Light");
        assert_eq!(index.members("Kitchen").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn commit_creates_then_unions() {
        let store = MemoryStore::new();
        store
            .set_object(&room_enum_id("X"), TreeObject::room("X", vec!["X.A".into()]))
            .await
            .unwrap();

        let mut index = RoomIndex::new();
        index.record("X", "X.B");
        index.record("Y", "Y.C");
        let report = index.commit(&store).await;

        assert_eq!(report.created, vec!["enum.rooms.y"]);
        assert_eq!(report.extended, vec!["enum.rooms.x"]);
        assert!(index.is_empty());

        let x = store.get_object("enum.rooms.x").await.unwrap().unwrap();
        assert_eq!(x.common.members, vec!["X.A", "X.B"]);
        let y = store.get_object("enum.rooms.y").await.unwrap().unwrap();
        assert_eq!(y.common.members, vec!["Y.C"]);
    }

    #[tokio::test]
    async fn failed_room_is_retried_on_next_commit() {
        let store = FailingStore::new();
        store.refuse("enum.rooms.x");

        let mut index = RoomIndex::new();
        index.record("X", "X.B");
        index.record("Y", "Y.C");
        let report = index.commit(&store).await;

        assert_eq!(report.failed, vec!["enum.rooms.x"]);
        assert_eq!(report.created, vec!["enum.rooms.y"]);
        assert_eq!(index.members("X").unwrap().iter().collect::<Vec<_>>(), vec!["X.B"]);
        assert!(index.members("Y").is_none());
        assert!(store.get_object("enum.rooms.x").await.unwrap().is_none());

        store.recover("enum.rooms.x");
        index.record("X", "X.D");
        let report = index.commit(&store).await;

        assert_eq!(report.created, vec!["enum.rooms.x"]);
        assert!(report.failed.is_empty());
        assert!(index.is_empty());
        let x = store.get_object("enum.rooms.x").await.unwrap().unwrap();
        assert_eq!(x.common.members, vec!["X.B", "X.D"]);
    }
}
