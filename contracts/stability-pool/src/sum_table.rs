//! Epoch/Scale Sum Table
//!
//! Cumulative per-unit-staked sums (S for collateral, G for the reward
//! token) paged by epoch and scale. Only the head page, the last scale of
//! the last epoch, is ever written; older pages are frozen.

use borsh::{BorshDeserialize, BorshSerialize};

use pool_ledger_common::{
    errors::{LedgerError, LedgerResult},
    math::ScaledSum,
};

/// Position of the head page, recorded so an aborted operation can
/// truncate pages it pushed and restore the head value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableMark {
    epochs: usize,
    scales_in_last_epoch: usize,
    head: ScaledSum,
}

/// `pages[epoch][scale]` of cumulative sums
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct EpochToScaleToSum {
    pages: Vec<Vec<ScaledSum>>,
}

impl Default for EpochToScaleToSum {
    fn default() -> Self {
        Self::new()
    }
}

impl EpochToScaleToSum {
    /// A table with a single zero page at (0, 0)
    pub fn new() -> Self {
        Self {
            pages: vec![vec![ScaledSum::ZERO]],
        }
    }

    /// Sum stored for `(epoch, scale)`, if that page exists
    pub fn get_sum(&self, epoch: u64, scale: u64) -> Option<ScaledSum> {
        let e = usize::try_from(epoch).ok()?;
        let s = usize::try_from(scale).ok()?;
        self.pages.get(e)?.get(s).copied()
    }

    /// Value of the head page
    pub fn head(&self) -> ScaledSum {
        self.pages
            .last()
            .and_then(|scales| scales.last())
            .copied()
            .unwrap_or_default()
    }

    /// Overwrite the head page
    pub fn set_head(&mut self, sum: ScaledSum) {
        if let Some(slot) = self.pages.last_mut().and_then(|scales| scales.last_mut()) {
            *slot = sum;
        }
    }

    /// Open a zero page for the next scale of the current epoch
    pub fn push_scale(&mut self) {
        match self.pages.last_mut() {
            Some(scales) => scales.push(ScaledSum::ZERO),
            None => self.pages.push(vec![ScaledSum::ZERO]),
        }
    }

    /// Open a new epoch with a zero page at scale 0
    pub fn push_epoch(&mut self) {
        self.pages.push(vec![ScaledSum::ZERO]);
    }

    /// Number of epochs with at least one page
    pub fn epoch_count(&self) -> usize {
        self.pages.len()
    }

    /// Number of scale pages in `epoch`
    pub fn scale_count(&self, epoch: u64) -> usize {
        usize::try_from(epoch)
            .ok()
            .and_then(|e| self.pages.get(e))
            .map_or(0, Vec::len)
    }

    /// Record the head position
    pub fn mark(&self) -> TableMark {
        TableMark {
            epochs: self.pages.len(),
            scales_in_last_epoch: self.pages.last().map_or(0, Vec::len),
            head: self.head(),
        }
    }

    /// Drop pages pushed after `mark` and restore its head value
    pub fn restore(&mut self, mark: &TableMark) {
        self.pages.truncate(mark.epochs);
        if let Some(scales) = self.pages.last_mut() {
            scales.truncate(mark.scales_in_last_epoch);
        }
        self.set_head(mark.head);
    }

    /// Check that the head page sits at `(epoch, scale)`
    pub fn validate_head(&self, epoch: u64, scale: u64) -> LedgerResult<()> {
        if self.pages.iter().any(Vec::is_empty) {
            return Err(LedgerError::CorruptImage {
                reason: "sum table has an epoch without pages",
            });
        }
        let epochs = u64::try_from(self.pages.len()).map_err(|_| LedgerError::Overflow)?;
        let scales = u64::try_from(self.scale_count(epoch)).map_err(|_| LedgerError::Overflow)?;
        if epochs != epoch.saturating_add(1) || scales != scale.saturating_add(1) {
            return Err(LedgerError::CorruptImage {
                reason: "sum table head does not match epoch and scale",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_table_has_origin_page() {
        let table = EpochToScaleToSum::new();
        assert_eq!(table.get_sum(0, 0), Some(ScaledSum::ZERO));
        assert_eq!(table.get_sum(0, 1), None);
        assert_eq!(table.get_sum(1, 0), None);
        assert!(table.validate_head(0, 0).is_ok());
    }

    #[test]
    fn test_pages_freeze_when_new_scale_opens() {
        let mut table = EpochToScaleToSum::new();
        table.set_head(ScaledSum::from(10));
        table.push_scale();
        table.set_head(ScaledSum::from(3));

        assert_eq!(table.get_sum(0, 0), Some(ScaledSum::from(10)));
        assert_eq!(table.get_sum(0, 1), Some(ScaledSum::from(3)));
        assert_eq!(table.head(), ScaledSum::from(3));

        table.push_epoch();
        assert_eq!(table.head(), ScaledSum::ZERO);
        assert_eq!(table.epoch_count(), 2);
        assert!(table.validate_head(1, 0).is_ok());
    }

    #[test]
    fn test_restore_undoes_pushes() {
        let mut table = EpochToScaleToSum::new();
        table.set_head(ScaledSum::from(7));
        let mark = table.mark();

        table.set_head(ScaledSum::from(9));
        table.push_scale();
        table.push_scale();
        table.push_epoch();
        table.set_head(ScaledSum::from(1));

        table.restore(&mark);
        assert_eq!(table, {
            let mut expected = EpochToScaleToSum::new();
            expected.set_head(ScaledSum::from(7));
            expected
        });
    }

    #[test]
    fn test_validate_head_rejects_mismatch() {
        let mut table = EpochToScaleToSum::new();
        table.push_scale();
        assert!(table.validate_head(0, 0).is_err());
        assert!(table.validate_head(0, 1).is_ok());
    }
}
