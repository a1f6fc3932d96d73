//! TableCharge: bill throughput measured elsewhere against a table

use crate::access::AccessTarget;
use crate::error::Result;
use crate::ops::{Operation, TableCharge};
use crate::tracker::{ExecContext, KB};

use super::OperationHandler;

impl OperationHandler {
    pub(super) fn table_charge(
        &self,
        op: &Operation,
        charge: &TableCharge,
        ctx: &mut ExecContext,
    ) -> Result<()> {
        let table = self.table(charge.table_id)?;
        self.authorize(op, &AccessTarget::table(&table))?;

        ctx.add_read_bytes((charge.read_kb as usize).saturating_mul(KB));
        ctx.add_write_bytes((charge.write_kb as usize).saturating_mul(KB), 0);
        tracing::trace!(
            "Charged {} read KB and {} write KB to table {}",
            charge.read_kb,
            charge.write_kb,
            table.id
        );
        Ok(())
    }
}
