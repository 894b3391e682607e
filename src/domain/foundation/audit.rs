//! Created/modified audit metadata carried by auditable entities.

use serde::{Deserialize, Serialize};

use super::Timestamp;

/// Who created and last modified an entity, and when.
///
/// Stamped by the unit of work right before commit; entities never set
/// these fields themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditInfo {
    pub created_by: Option<String>,
    pub created_at: Option<Timestamp>,
    pub modified_by: Option<String>,
    pub modified_at: Option<Timestamp>,
}

impl AuditInfo {
    /// Stamps a newly added entity: created and modified fields get the same values.
    pub fn stamp_created(&mut self, at: Timestamp, actor: &str) {
        self.created_by = Some(actor.to_string());
        self.created_at = Some(at);
        self.modified_by = Some(actor.to_string());
        self.modified_at = Some(at);
    }

    /// Stamps a modified entity; creation fields are left untouched.
    pub fn stamp_modified(&mut self, at: Timestamp, actor: &str) {
        self.modified_by = Some(actor.to_string());
        self.modified_at = Some(at);
    }
}
