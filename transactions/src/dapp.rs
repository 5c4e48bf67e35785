//! Side-chain application registration.

use crate::apply::ApplyEnv;
use crate::error::TransactionError;
use crate::kind::{require_no_recipient, require_zero_amount, TransactionKind};
use crate::{Transaction, TransactionType};
use kestrel_store::{Account, DappRecord, StateStore};
use kestrel_types::{ChainParams, FeeSchedule};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const MAX_NAME_LENGTH: usize = 32;
const MAX_DESCRIPTION_LENGTH: usize = 160;
const MAX_TAGS_LENGTH: usize = 160;
const MAX_LINK_LENGTH: usize = 2000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum DappCategory {
    Education = 0,
    Entertainment = 1,
    Finance = 2,
    Games = 3,
    Miscellaneous = 4,
    Social = 5,
    Science = 6,
    Technology = 7,
    Utilities = 8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DappAsset {
    pub category: DappCategory,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Comma-separated.
    #[serde(default)]
    pub tags: Option<String>,
    /// Only type 0 (a zipped application) exists.
    #[serde(default)]
    pub dapp_type: i32,
    pub link: String,
    #[serde(default)]
    pub icon: Option<String>,
}

fn invalid(reason: impl Into<String>) -> TransactionError {
    TransactionError::InvalidAsset(reason.into())
}

impl TransactionKind for DappAsset {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::Dapp
    }

    fn fee(&self, fees: &FeeSchedule) -> u64 {
        fees.dapp
    }

    fn write_asset_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.name.as_bytes());
        if let Some(description) = &self.description {
            out.extend_from_slice(description.as_bytes());
        }
        if let Some(tags) = &self.tags {
            out.extend_from_slice(tags.as_bytes());
        }
        out.extend_from_slice(self.link.as_bytes());
        if let Some(icon) = &self.icon {
            out.extend_from_slice(icon.as_bytes());
        }
        out.extend_from_slice(&self.dapp_type.to_le_bytes());
        out.extend_from_slice(&(self.category as i32).to_le_bytes());
    }

    fn validate(&self, tx: &Transaction, _params: &ChainParams) -> Result<(), TransactionError> {
        require_no_recipient(tx)?;
        require_zero_amount(tx)?;
        if self.dapp_type != 0 {
            return Err(invalid(format!("unknown application type {}", self.dapp_type)));
        }
        let name = self.name.trim();
        if name.is_empty() || name != self.name || name.len() > MAX_NAME_LENGTH {
            return Err(invalid("application name must be 1 to 32 characters, untrimmed"));
        }
        if self
            .description
            .as_ref()
            .is_some_and(|d| d.len() > MAX_DESCRIPTION_LENGTH)
        {
            return Err(invalid("application description is too long"));
        }
        if let Some(tags) = &self.tags {
            if tags.len() > MAX_TAGS_LENGTH {
                return Err(invalid("application tags are too long"));
            }
            let mut seen = HashSet::new();
            for tag in tags.split(',').map(str::trim) {
                if !seen.insert(tag) {
                    return Err(invalid(format!("duplicate tag {tag:?}")));
                }
            }
        }
        let link_ok = (self.link.starts_with("http://") || self.link.starts_with("https://"))
            && self.link.ends_with(".zip")
            && self.link.len() <= MAX_LINK_LENGTH;
        if !link_ok {
            return Err(invalid("application link must be an http(s) url to a .zip"));
        }
        if let Some(icon) = &self.icon {
            let icon_ok = (icon.starts_with("http://") || icon.starts_with("https://"))
                && [".png", ".jpg", ".jpeg"].iter().any(|ext| icon.ends_with(ext));
            if !icon_ok {
                return Err(invalid("application icon must be a png or jpeg url"));
            }
        }
        Ok(())
    }

    fn apply(
        &self,
        tx: &Transaction,
        sender: &mut Account,
        state: &mut StateStore<'_>,
        _env: &ApplyEnv<'_>,
    ) -> Result<(), TransactionError> {
        if state.dapp_by_name(&self.name)?.is_some() {
            return Err(TransactionError::DappNameTaken(self.name.clone()));
        }
        if state.dapp_by_link(&self.link)?.is_some() {
            return Err(TransactionError::DappLinkTaken(self.link.clone()));
        }
        state.put_dapp(DappRecord {
            transaction_id: tx.id,
            owner: sender.address,
            name: self.name.clone(),
            link: self.link.clone(),
        });
        Ok(())
    }

    fn undo(
        &self,
        tx: &Transaction,
        _sender: &mut Account,
        state: &mut StateStore<'_>,
        _env: &ApplyEnv<'_>,
    ) -> Result<(), TransactionError> {
        state.remove_dapp(&tx.id);
        Ok(())
    }
}
