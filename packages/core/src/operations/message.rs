//! Typed Operation Outbox
//!
//! Pipeline steps communicate across lifecycle phases through typed
//! messages on the operation rather than through shared mutable state: a
//! setup step that discovers unresolvable relations pushes a
//! [`Message::PendingRelations`]; the after-commit step that parks them
//! takes it back out. Each message is pushed with a consumption requirement,
//! and the operation verifies at the end of its run that nothing marked
//! required was left behind; a leftover required message means a
//! misconfigured pipeline, not bad caller data.

/// Discriminant for message lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Outcome of the persistence gateway commit
    CommitOutcome,

    /// Relation values waiting on unmapped remote IDs
    PendingRelations,

    /// Caller-declared ordering intent for an ordered MM relation field
    RelationOrderIntent,
}

/// Relations of one field that could not be resolved yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRelationMessage {
    /// Relation field the values belong to
    pub field: String,

    /// Remote IDs that were not mapped at setup time
    pub remote_ids: Vec<String>,
}

/// One cross-step message
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Pushed after the gateway commit; `success` is false when the
    /// gateway's error log is non-empty
    CommitOutcome { success: bool },

    /// Unresolved relation values to park after commit
    PendingRelations(PendingRelationMessage),

    /// Ordering intent to stash as mapping metadata after commit
    RelationOrderIntent {
        field: String,
        remote_ids: Vec<String>,
    },
}

impl Message {
    /// Kind discriminant
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::CommitOutcome { .. } => MessageKind::CommitOutcome,
            Self::PendingRelations(_) => MessageKind::PendingRelations,
            Self::RelationOrderIntent { .. } => MessageKind::RelationOrderIntent,
        }
    }
}

/// Whether an unconsumed message constitutes a pipeline defect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumption {
    /// Some step must retrieve this message before the operation finishes
    Required,

    /// Informational; may be left unconsumed
    Optional,
}

#[derive(Debug)]
struct Entry {
    message: Message,
    consumption: Consumption,
    consumed: bool,
}

/// Message queue carried by one record operation
#[derive(Debug, Default)]
pub struct Outbox {
    entries: Vec<Entry>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a message with its consumption requirement
    pub fn push(&mut self, message: Message, consumption: Consumption) {
        self.entries.push(Entry {
            message,
            consumption,
            consumed: false,
        });
    }

    /// Take all unconsumed messages of a kind, in push order
    pub fn take_all(&mut self, kind: MessageKind) -> Vec<Message> {
        let mut taken = Vec::new();
        for entry in &mut self.entries {
            if !entry.consumed && entry.message.kind() == kind {
                entry.consumed = true;
                taken.push(entry.message.clone());
            }
        }
        taken
    }

    /// Take the latest unconsumed message of a kind, consuming all of them
    pub fn take_latest(&mut self, kind: MessageKind) -> Option<Message> {
        self.take_all(kind).pop()
    }

    /// Kinds of required messages no step has retrieved
    pub fn unconsumed_required(&self) -> Vec<MessageKind> {
        self.entries
            .iter()
            .filter(|e| !e.consumed && e.consumption == Consumption::Required)
            .map(|e| e.message.kind())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_all_consumes_in_push_order() {
        let mut outbox = Outbox::new();
        outbox.push(
            Message::PendingRelations(PendingRelationMessage {
                field: "a".to_string(),
                remote_ids: vec!["x".to_string()],
            }),
            Consumption::Required,
        );
        outbox.push(
            Message::PendingRelations(PendingRelationMessage {
                field: "b".to_string(),
                remote_ids: vec!["y".to_string()],
            }),
            Consumption::Required,
        );

        let taken = outbox.take_all(MessageKind::PendingRelations);
        assert_eq!(taken.len(), 2);
        assert!(matches!(
            &taken[0],
            Message::PendingRelations(m) if m.field == "a"
        ));

        // Second take finds nothing.
        assert!(outbox.take_all(MessageKind::PendingRelations).is_empty());
    }

    #[test]
    fn test_take_latest_returns_newest() {
        let mut outbox = Outbox::new();
        outbox.push(
            Message::CommitOutcome { success: false },
            Consumption::Required,
        );
        outbox.push(
            Message::CommitOutcome { success: true },
            Consumption::Required,
        );

        assert_eq!(
            outbox.take_latest(MessageKind::CommitOutcome),
            Some(Message::CommitOutcome { success: true })
        );
        assert!(outbox.unconsumed_required().is_empty());
    }

    #[test]
    fn test_unconsumed_required_tracking() {
        let mut outbox = Outbox::new();
        outbox.push(
            Message::CommitOutcome { success: true },
            Consumption::Required,
        );
        outbox.push(
            Message::RelationOrderIntent {
                field: "media".to_string(),
                remote_ids: vec![],
            },
            Consumption::Optional,
        );

        assert_eq!(
            outbox.unconsumed_required(),
            vec![MessageKind::CommitOutcome]
        );

        outbox.take_latest(MessageKind::CommitOutcome);
        assert!(outbox.unconsumed_required().is_empty());
    }
}
