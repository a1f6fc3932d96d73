//! MultiGet / MultiGetKeys and MultiGetTable / MultiGetTableKeys
//!
//! Both return every record under a parent key in one batch. The plain kinds
//! scan the untyped keyspace and hold their read locks until the
//! transaction ends; the table kinds filter by target table and expand
//! ancestors.

use crate::access::AccessTarget;
use crate::error::Result;
use crate::keyspace::{Key, KeyRange, KeySpace, ScanBounds};
use crate::ops::{IterateResult, MultiGet, MultiGetTable, Operation, ResultRecord};
use crate::schema::ResolvedTargets;
use crate::store::{CursorConfig, Direction, Transaction};
use crate::tracker::ExecContext;

use super::ancestor::AncestorList;
use super::common::{charge_scanned, result_record};
use super::scanner::{scan_targets, BatchLimits, ScanOutcome, Scanner};
use super::OperationHandler;

/// One table range scan
pub(super) struct RowScan<'s> {
    pub parent_key: &'s [u8],
    pub sub_range: Option<&'s KeyRange>,
    pub direction: Direction,
    pub resume_key: Option<Vec<u8>>,
    pub include_tombstones: bool,
    pub keys_only: bool,
}

impl OperationHandler {
    pub(super) fn multi_get(
        &self,
        op: &Operation,
        multi_get: &MultiGet,
        keys_only: bool,
        ctx: &mut ExecContext,
        txn: &Transaction,
    ) -> Result<IterateResult> {
        let keyspace = KeySpace::classify(&multi_get.parent_key);
        self.authorize(op, &AccessTarget::Keyspace(keyspace))?;

        let parent = Key::from_bytes(&multi_get.parent_key)?;
        let bounds = ScanBounds::for_parent(&parent, multi_get.sub_range.as_ref());
        let cursor = self.store.open_cursor(txn, self.cursor_config(op, ctx))?;
        let mut scanner = Scanner::new(
            cursor,
            bounds,
            Direction::Forward,
            None,
            multi_get.include_tombstones,
        );

        let mut records = Vec::new();
        while let Some((key, record)) = scanner.next()? {
            charge_scanned(ctx, key.len(), &record, keys_only);
            records.push(result_record(key, &record, keys_only));
        }
        if records.is_empty() {
            ctx.add_empty_read_charge();
        }

        Ok(IterateResult {
            records,
            ..IterateResult::default()
        })
    }

    pub(super) fn multi_get_table(
        &self,
        op: &Operation,
        multi_get: &MultiGetTable,
        keys_only: bool,
        ctx: &mut ExecContext,
        txn: &Transaction,
    ) -> Result<IterateResult> {
        self.authorize_targets(op, &multi_get.targets)?;
        let targets = multi_get.targets.resolve(self.metadata.as_ref())?;

        let config = self.cursor_config(op, ctx);
        let mut ancestors = self.ancestor_list(txn, config, &targets, multi_get.include_tombstones)?;
        let scan = RowScan {
            parent_key: &multi_get.parent_key,
            sub_range: multi_get.sub_range.as_ref(),
            direction: Direction::Forward,
            resume_key: None,
            include_tombstones: multi_get.include_tombstones,
            keys_only,
        };
        let (records, _) = self.scan_rows(
            scan,
            &targets,
            &BatchLimits::default(),
            &mut ancestors,
            config,
            ctx,
            txn,
        )?;

        Ok(IterateResult {
            records,
            ..IterateResult::default()
        })
    }

    /// Scan target rows under one parent key, ancestors first
    #[allow(clippy::too_many_arguments)]
    pub(super) fn scan_rows(
        &self,
        scan: RowScan<'_>,
        targets: &ResolvedTargets,
        limits: &BatchLimits,
        ancestors: &mut AncestorList<'_>,
        config: CursorConfig,
        ctx: &mut ExecContext,
        txn: &Transaction,
    ) -> Result<(Vec<ResultRecord>, ScanOutcome)> {
        let parent = Key::from_bytes(scan.parent_key)?;
        let bounds = ScanBounds::for_parent(&parent, scan.sub_range);
        let cursor = self.store.open_cursor(txn, config)?;
        let mut scanner = Scanner::new(
            cursor,
            bounds,
            scan.direction,
            scan.resume_key,
            scan.include_tombstones,
        );

        let keys_only = scan.keys_only;
        let mut records = Vec::new();
        let outcome = scan_targets(&mut scanner, targets, limits, ctx, |_, key, record, _, ctx| {
            ancestors.add_ancestors(key, keys_only, ctx, &mut records)?;
            charge_scanned(ctx, key.len(), record, keys_only);
            records.push(result_record(key.to_vec(), record, keys_only));
            Ok(())
        })?;
        Ok((records, outcome))
    }
}
