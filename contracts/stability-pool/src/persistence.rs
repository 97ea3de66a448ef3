//! Ledger Images
//!
//! Durable encoding of the pool state plus one snapshot row per depositor
//! and one record per registered front end.
//!
//! Layout: `MAGIC (4) | version (u16 LE) | sha256(payload) (32) | payload`,
//! where the payload is the borsh encoding of [`LedgerImage`].

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};

use pool_ledger_common::{
    constants::{
        image::{HEADER_LEN, MAGIC, VERSION},
        precision::ONE,
    },
    errors::{LedgerError, LedgerResult},
    types::{DepositorId, DepositorSnapshot, FrontEnd, FrontEndId},
};

use crate::pool_state::PoolState;

/// Pool state, snapshot rows and front ends
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct LedgerImage {
    pub state: PoolState,
    pub snapshots: Vec<(DepositorId, DepositorSnapshot)>,
    pub front_ends: Vec<(FrontEndId, FrontEnd)>,
}

impl LedgerImage {
    /// Frame and checksum the image
    pub fn encode(&self) -> LedgerResult<Vec<u8>> {
        let payload = borsh::to_vec(self).map_err(|_| LedgerError::CorruptImage {
            reason: "image could not be serialized",
        })?;
        let digest = Sha256::digest(&payload);

        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&digest);
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Verify the frame and decode the payload
    pub fn decode(bytes: &[u8]) -> LedgerResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(LedgerError::CorruptImage {
                reason: "image shorter than its header",
            });
        }
        let (header, payload) = bytes.split_at(HEADER_LEN);

        if header[..4] != MAGIC {
            return Err(LedgerError::CorruptImage {
                reason: "bad magic",
            });
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(LedgerError::CorruptImage {
                reason: "unsupported image version",
            });
        }
        if Sha256::digest(payload).as_slice() != &header[6..HEADER_LEN] {
            return Err(LedgerError::ChecksumMismatch);
        }

        borsh::from_slice(payload).map_err(|_| LedgerError::CorruptImage {
            reason: "payload does not decode",
        })
    }

    /// Cross-check snapshots against the pool state
    pub fn validate(&self) -> LedgerResult<()> {
        self.state.validate()?;

        if self.snapshots.windows(2).any(|w| w[0].0 >= w[1].0) {
            return Err(LedgerError::CorruptImage {
                reason: "snapshot rows unsorted or duplicated",
            });
        }
        if self.front_ends.windows(2).any(|w| w[0].0 >= w[1].0) {
            return Err(LedgerError::CorruptImage {
                reason: "front ends unsorted or duplicated",
            });
        }

        for (_, snapshot) in &self.snapshots {
            if snapshot.is_empty() {
                return Err(LedgerError::CorruptImage {
                    reason: "empty snapshot row",
                });
            }
            self.check_snapshot_pages(snapshot)?;
            if let Some(tag) = snapshot.front_end {
                if self.front_ends.binary_search_by(|(id, _)| id.cmp(&tag)).is_err() {
                    return Err(LedgerError::CorruptImage {
                        reason: "deposit tagged with an unregistered front end",
                    });
                }
            }
        }
        for (id, front_end) in &self.front_ends {
            if front_end.kickback_rate > ONE {
                return Err(LedgerError::CorruptImage {
                    reason: "kickback rate above one",
                });
            }
            if !front_end.stake.is_empty() {
                self.check_snapshot_pages(&front_end.stake)?;
            }
            if self.snapshots.binary_search_by(|(row, _)| row.cmp(id)).is_ok() {
                return Err(LedgerError::CorruptImage {
                    reason: "front end holds a deposit",
                });
            }
        }
        if self.snapshots.len() as u64 != self.state.depositor_count {
            return Err(LedgerError::CorruptImage {
                reason: "depositor count does not match rows",
            });
        }
        Ok(())
    }

    fn check_snapshot_pages(&self, snapshot: &DepositorSnapshot) -> LedgerResult<()> {
        if snapshot.p == 0 || self.state.s_table.get_sum(snapshot.epoch, snapshot.scale).is_none() {
            return Err(LedgerError::CorruptImage {
                reason: "snapshot ahead of pool state",
            });
        }
        Ok(())
    }
}
