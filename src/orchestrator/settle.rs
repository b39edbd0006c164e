//! Settle: the terminal transition of a claimed row into History (DONE)
//! or DLQ (FAILED). Append-then-delete so a crash between the two
//! writes leaves at worst a visible duplicate in History, never a lost
//! record (spec §4.5.2, §8 append-before-delete property).

use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::schema::SheetKind;

/// Append `settled_row` to `dest`, then delete `pending_index` from
/// `pending`. Order matters — see module docs.
pub fn settle(
    gateway: &Gateway,
    pending: SheetKind,
    pending_index: usize,
    dest: SheetKind,
    settled_row: Vec<String>,
) -> Result<(), GatewayError> {
    gateway.append(dest, settled_row)?;
    gateway.delete_row(pending, pending_index)?;
    Ok(())
}
