//! Get

use crate::error::Result;
use crate::ops::{Get, GetResult, Operation};
use crate::store::Transaction;
use crate::tracker::ExecContext;

use super::OperationHandler;

impl OperationHandler {
    pub(super) fn get(
        &self,
        op: &Operation,
        get: &Get,
        ctx: &mut ExecContext,
        txn: &Transaction,
    ) -> Result<GetResult> {
        let table = self.opt_table(get.table_id)?;
        self.authorize_key(op, table.as_ref(), &get.key)?;

        let mut cursor = self.store.open_cursor(txn, self.cursor_config(op, ctx))?;
        match cursor.search(&get.key)? {
            Some(record) if !record.tombstone => {
                ctx.add_read_bytes(record.storage_size(get.key.len()));
                Ok(GetResult {
                    value: Some(record.value),
                    version: Some(record.version),
                    creation_time: record.creation_time,
                    modification_time: record.modification_time,
                    expiration_time: record.expiration_time,
                })
            }
            _ => {
                ctx.add_empty_read_charge();
                Ok(GetResult::default())
            }
        }
    }
}
