//! The settlement planner.
//!
//! Given the snapshotted cart lines and the sellers they reference, the planner classifies the cart into one of
//! the three settlement topologies and computes how the money is split. It is pure and synchronous: every
//! decision about who gets paid what is made here, before any processor or database call, so the split logic can
//! be tested exhaustively in isolation.

use std::collections::BTreeMap;

use mpg_common::{CommissionRate, Money};
use thiserror::Error;

use crate::db_types::{NewOrderLine, OwningParty, Seller, SettlementTopology};

#[derive(Debug, Clone, Error)]
pub enum PlanError {
    #[error("The cart is empty")]
    EmptyCart,
    #[error("Cart line references unknown seller {0}")]
    UnknownSeller(i64),
    #[error("Sellers are not ready to receive payments: {}", .sellers.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", "))]
    SellerNotOnboarded { sellers: Vec<i64> },
    #[error("Cart line for product {product_id} has non-positive quantity {quantity}")]
    InvalidQuantity { product_id: i64, quantity: i64 },
}

/// The fee instruction handed to the payment processor at authorization time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeeSpec {
    /// Charge the platform account in full. Used for platform-only carts (the platform keeps everything) and
    /// multi-party carts (sellers are paid by transfers after capture).
    PlatformCharge,
    /// A destination charge: the processor routes the seller's share to `destination` atomically at capture,
    /// retaining `application_fee` for the platform.
    DestinationCharge { destination: String, application_fee: Money },
}

/// One planned payout to a seller, executed by the transfer executor after capture confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTransfer {
    pub seller_id: i64,
    pub destination_account: String,
    /// The seller subtotal less the platform commission.
    pub amount: Money,
}

#[derive(Debug, Clone)]
pub struct SettlementPlan {
    pub topology: SettlementTopology,
    pub total: Money,
    pub fee_spec: FeeSpec,
    /// Empty unless the topology is `MultiParty`.
    pub transfers: Vec<PlannedTransfer>,
    /// What the platform keeps: its own lines plus commission on seller lines.
    pub platform_retention: Money,
}

pub struct SettlementPlanner {
    commission: CommissionRate,
}

impl SettlementPlanner {
    pub fn new(commission: CommissionRate) -> Self {
        Self { commission }
    }

    pub fn commission(&self) -> CommissionRate {
        self.commission
    }

    /// Classify the cart and compute the split.
    ///
    /// `sellers` must contain every seller referenced by a cart line. Any referenced seller that is not in
    /// `Connected` state fails the whole plan and is named in the error; blocked items are never silently
    /// dropped from a checkout.
    pub fn plan(&self, lines: &[NewOrderLine], sellers: &[Seller]) -> Result<SettlementPlan, PlanError> {
        if lines.is_empty() {
            return Err(PlanError::EmptyCart);
        }
        for line in lines {
            if line.quantity <= 0 {
                return Err(PlanError::InvalidQuantity { product_id: line.product_id, quantity: line.quantity });
            }
        }
        let total: Money = lines.iter().map(|l| l.subtotal()).sum();

        // Subtotal per distinct seller, in stable id order
        let mut seller_subtotals: BTreeMap<i64, Money> = BTreeMap::new();
        for line in lines {
            if let Some(id) = line.seller_id {
                let entry = seller_subtotals.entry(id).or_default();
                *entry = *entry + line.subtotal();
            }
        }

        let mut not_onboarded = Vec::new();
        let mut payout_accounts: BTreeMap<i64, String> = BTreeMap::new();
        for id in seller_subtotals.keys() {
            let seller = sellers.iter().find(|s| s.id == *id).ok_or(PlanError::UnknownSeller(*id))?;
            if seller.can_receive_transfers() {
                payout_accounts.insert(*id, seller.payout_account.clone());
            } else {
                not_onboarded.push(*id);
            }
        }
        if !not_onboarded.is_empty() {
            return Err(PlanError::SellerNotOnboarded { sellers: not_onboarded });
        }

        let has_platform_lines = lines.iter().any(|l| l.seller_id.is_none());
        let plan = match (seller_subtotals.len(), has_platform_lines) {
            (0, _) => SettlementPlan {
                topology: SettlementTopology::PlatformOnly,
                total,
                fee_spec: FeeSpec::PlatformCharge,
                transfers: Vec::new(),
                platform_retention: total,
            },
            (1, false) => {
                let (seller_id, subtotal) = seller_subtotals.into_iter().next().unwrap();
                let application_fee = self.commission.fee_on(subtotal);
                SettlementPlan {
                    topology: SettlementTopology::SingleSeller,
                    total,
                    fee_spec: FeeSpec::DestinationCharge {
                        destination: payout_accounts.remove(&seller_id).unwrap(),
                        application_fee,
                    },
                    transfers: Vec::new(),
                    platform_retention: application_fee,
                }
            },
            _ => {
                let transfers = seller_subtotals
                    .iter()
                    .map(|(seller_id, subtotal)| PlannedTransfer {
                        seller_id: *seller_id,
                        destination_account: payout_accounts[seller_id].clone(),
                        amount: self.commission.remainder_of(*subtotal),
                    })
                    .collect::<Vec<_>>();
                let paid_out: Money = transfers.iter().map(|t| t.amount).sum();
                SettlementPlan {
                    topology: SettlementTopology::MultiParty,
                    total,
                    fee_spec: FeeSpec::PlatformCharge,
                    transfers,
                    platform_retention: total - paid_out,
                }
            },
        };
        debug_assert!(plan.conserves_funds());
        Ok(plan)
    }
}

impl SettlementPlan {
    /// No money created or destroyed: transfers plus platform retention reassemble the authorized total.
    pub fn conserves_funds(&self) -> bool {
        let paid_out: Money = self.transfers.iter().map(|t| t.amount).sum();
        match &self.fee_spec {
            FeeSpec::PlatformCharge => paid_out + self.platform_retention == self.total,
            FeeSpec::DestinationCharge { application_fee, .. } => {
                // The destination receives total - fee at capture; nothing else moves
                *application_fee == self.platform_retention && paid_out == Money::default()
            },
        }
    }

    /// The party that would own a refund covering the given lines, if that set of lines is refundable at all.
    pub fn refund_owner(lines: &[&crate::db_types::OrderLine]) -> Option<OwningParty> {
        let mut owners = lines.iter().map(|l| l.seller_id).collect::<Vec<_>>();
        owners.sort_unstable();
        owners.dedup();
        match owners.as_slice() {
            [None] => Some(OwningParty::Platform),
            [Some(id)] => Some(OwningParty::Seller(*id)),
            _ => None,
        }
    }
}
