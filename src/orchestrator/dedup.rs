//! Task id deduplication (spec §4.5.3): before fan-out appends a new
//! Task row, its id must not already exist anywhere across
//! Tasks.Pending ∪ Tasks.History ∪ Tasks.DLQ. Makes fan-out idempotent
//! under leader crash-and-retry.

use std::collections::HashSet;

use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::schema::SheetKind;

/// Column 0 holds `id` in all three Task sheet variants (spec §6).
const TASK_ID_COLUMN: usize = 0;

pub fn existing_task_ids(gateway: &Gateway) -> Result<HashSet<String>, GatewayError> {
    let mut ids = HashSet::new();
    for sheet in [SheetKind::TasksPending, SheetKind::TasksHistory, SheetKind::TasksDlq] {
        let rows = gateway.read_all(sheet)?;
        for row in rows.iter().skip(1) {
            if let Some(id) = row.get(TASK_ID_COLUMN) {
                if !id.is_empty() {
                    ids.insert(id.clone());
                }
            }
        }
    }
    Ok(ids)
}
