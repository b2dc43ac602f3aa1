use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use mpg_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Conversion error: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------        OrderId        -------------------------------------------------------
/// The checkout reference assigned by the storefront when the cart is submitted. It is the caller's reservation
/// key: submitting the same `OrderId` twice never decrements stock twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------  SettlementTopology   -------------------------------------------------------
/// How the funds for an order are split between the platform and its sellers. The topology is decided once, by the
/// settlement planner, and drives which processor primitive is used to move money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum SettlementTopology {
    /// Every line is platform-owned. The platform keeps the full amount; no fee, no transfers.
    PlatformOnly,
    /// All lines belong to one seller. A destination charge splits the funds at capture time.
    SingleSeller,
    /// Lines span the platform and/or several sellers. The platform is charged in full and the transfer
    /// executor pays each seller afterwards.
    MultiParty,
}

impl Display for SettlementTopology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettlementTopology::PlatformOnly => write!(f, "PlatformOnly"),
            SettlementTopology::SingleSeller => write!(f, "SingleSeller"),
            SettlementTopology::MultiParty => write!(f, "MultiParty"),
        }
    }
}

impl FromStr for SettlementTopology {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PlatformOnly" => Ok(Self::PlatformOnly),
            "SingleSeller" => Ok(Self::SingleSeller),
            "MultiParty" => Ok(Self::MultiParty),
            s => Err(ConversionError(format!("Invalid settlement topology: {s}"))),
        }
    }
}

//--------------------------------------   OrderStatusType     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order has been created and stock reserved, but payment capture has not been confirmed.
    Pending,
    /// The processor confirmed capture. From the customer's perspective the order is complete.
    Paid,
    /// Settlement requires manual intervention. Only ever applied by reconciliation tooling; the automated
    /// path keeps orders `Paid` and raises the reconciliation flag instead.
    SettlementFailed,
    /// At least one refund against this order is open.
    RefundRequested,
    /// The full order amount has been refunded.
    Refunded,
    /// The order was cancelled before capture (e.g. the authorization was declined).
    Cancelled,
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Pending => write!(f, "Pending"),
            OrderStatusType::Paid => write!(f, "Paid"),
            OrderStatusType::SettlementFailed => write!(f, "SettlementFailed"),
            OrderStatusType::RefundRequested => write!(f, "RefundRequested"),
            OrderStatusType::Refunded => write!(f, "Refunded"),
            OrderStatusType::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            "SettlementFailed" => Ok(Self::SettlementFailed),
            "RefundRequested" => Ok(Self::RefundRequested),
            "Refunded" => Ok(Self::Refunded),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------   DeliveryContact     -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryContact {
    pub name: String,
    pub email: String,
    pub address: String,
}

impl DeliveryContact {
    /// Checkout-time validation. Deliberately shallow: the storefront owns real address validation, but an
    /// order without a deliverable contact must never reach the processor.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Delivery contact name is empty".to_string());
        }
        if !self.email.contains('@') {
            return Err(format!("Delivery contact email '{}' is not an email address", self.email));
        }
        if self.address.trim().is_empty() {
            return Err("Delivery address is empty".to_string());
        }
        Ok(())
    }
}

//--------------------------------------        Order          -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    /// The storefront customer, if one was signed in. Guest checkouts carry a session id instead.
    pub customer_id: Option<String>,
    pub session_id: Option<String>,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_address: String,
    pub total_price: Money,
    pub currency: String,
    pub topology: SettlementTopology,
    /// The processor authorization handle. This is the sole correlation key from capture confirmations back
    /// to the order.
    pub authorization_id: Option<String>,
    pub status: OrderStatusType,
    /// Set when automated settlement could not deliver a seller payout. Surfaced on the admin dashboard;
    /// never visible to the customer.
    pub needs_reconciliation: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------       NewOrder        -------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub customer_id: Option<String>,
    pub session_id: Option<String>,
    pub contact: DeliveryContact,
    pub total_price: Money,
    pub currency: String,
    pub topology: SettlementTopology,
}

impl NewOrder {
    pub fn new(order_id: OrderId, contact: DeliveryContact, total_price: Money, topology: SettlementTopology) -> Self {
        Self {
            order_id,
            customer_id: None,
            session_id: None,
            contact,
            total_price,
            currency: mpg_common::DEFAULT_CURRENCY_CODE.to_string(),
            topology,
        }
    }

    pub fn with_customer(mut self, customer_id: String) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_session(mut self, session_id: String) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

//--------------------------------------      OrderLine        -------------------------------------------------------
/// A snapshot of a purchased item, captured at order time. Price and seller never track the live product record;
/// a price or ownership change after checkout must not rewrite a historical order.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    /// `None` marks a platform-owned line.
    pub seller_id: Option<i64>,
    pub unit_price: Money,
    pub quantity: i64,
}

impl OrderLine {
    pub fn subtotal(&self) -> Money {
        self.unit_price * self.quantity
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderLine {
    pub product_id: i64,
    pub seller_id: Option<i64>,
    pub unit_price: Money,
    pub quantity: i64,
}

impl NewOrderLine {
    pub fn subtotal(&self) -> Money {
        self.unit_price * self.quantity
    }
}

//--------------------------------------       Product         -------------------------------------------------------
/// The catalog view this engine is allowed to see: price, owner and stock. Catalog CRUD lives elsewhere; the
/// engine only reads product rows and decrements stock.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub seller_id: Option<i64>,
    pub price: Money,
    pub stock: i64,
}

//--------------------------------------  OnboardingStatus     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OnboardingStatus {
    NotConnected,
    Pending,
    Connected,
    Restricted,
}

impl Display for OnboardingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OnboardingStatus::NotConnected => write!(f, "NotConnected"),
            OnboardingStatus::Pending => write!(f, "Pending"),
            OnboardingStatus::Connected => write!(f, "Connected"),
            OnboardingStatus::Restricted => write!(f, "Restricted"),
        }
    }
}

impl FromStr for OnboardingStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NotConnected" => Ok(Self::NotConnected),
            "Pending" => Ok(Self::Pending),
            "Connected" => Ok(Self::Connected),
            "Restricted" => Ok(Self::Restricted),
            s => Err(ConversionError(format!("Invalid onboarding status: {s}"))),
        }
    }
}

//--------------------------------------        Seller         -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Seller {
    pub id: i64,
    pub name: String,
    /// The processor-side payout account for this seller.
    pub payout_account: String,
    pub onboarding_status: OnboardingStatus,
    pub created_at: DateTime<Utc>,
}

impl Seller {
    pub fn can_receive_transfers(&self) -> bool {
        self.onboarding_status == OnboardingStatus::Connected
    }
}

//--------------------------------------   TransferStatus      -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TransferStatus {
    Pending,
    Succeeded,
    /// All attempts failed. The row is a permanent audit record of money owed to a seller that the automated
    /// path could not deliver.
    FailedExhausted,
}

impl Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferStatus::Pending => write!(f, "Pending"),
            TransferStatus::Succeeded => write!(f, "Succeeded"),
            TransferStatus::FailedExhausted => write!(f, "FailedExhausted"),
        }
    }
}

impl FromStr for TransferStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Succeeded" => Ok(Self::Succeeded),
            "FailedExhausted" => Ok(Self::FailedExhausted),
            s => Err(ConversionError(format!("Invalid transfer status: {s}"))),
        }
    }
}

//--------------------------------------       Transfer        -------------------------------------------------------
/// One seller payout for one order. Created after capture confirmation on multi-party orders; never deleted.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transfer {
    pub id: i64,
    pub order_id: i64,
    pub seller_id: i64,
    pub amount: Money,
    pub destination_account: String,
    pub attempts: i64,
    pub status: TransferStatus,
    pub last_error: Option<String>,
    /// The processor's transfer reference, present once the payout succeeded.
    pub processor_transfer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransfer {
    pub order_id: i64,
    pub seller_id: i64,
    pub amount: Money,
    pub destination_account: String,
}

//--------------------------------------     OwningParty       -------------------------------------------------------
/// The party that owns a refund: either the platform, or exactly one seller. Derived once from the seller
/// references of the covered order lines when the refund is created, and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwningParty {
    Platform,
    Seller(i64),
}

impl Display for OwningParty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OwningParty::Platform => write!(f, "platform"),
            OwningParty::Seller(id) => write!(f, "seller:{id}"),
        }
    }
}

impl FromStr for OwningParty {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "platform" {
            return Ok(Self::Platform);
        }
        match s.strip_prefix("seller:") {
            Some(id) => {
                let id = id.parse::<i64>().map_err(|e| ConversionError(format!("Invalid owning party '{s}': {e}")))?;
                Ok(Self::Seller(id))
            },
            None => Err(ConversionError(format!("Invalid owning party: {s}"))),
        }
    }
}

//--------------------------------------      Principal        -------------------------------------------------------
/// A typed identity handed to us by the session/auth collaborator. The engine trusts it; it performs no
/// credential verification of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Principal {
    PlatformAdmin,
    Seller(i64),
}

impl Principal {
    /// The authorization predicate for refund processing: platform admins own platform refunds, a seller owns
    /// its own refunds, and nobody else.
    pub fn owns(&self, party: &OwningParty) -> bool {
        match (self, party) {
            (Principal::PlatformAdmin, OwningParty::Platform) => true,
            (Principal::Seller(a), OwningParty::Seller(b)) => a == b,
            _ => false,
        }
    }
}

impl Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Principal::PlatformAdmin => write!(f, "platform-admin"),
            Principal::Seller(id) => write!(f, "seller:{id}"),
        }
    }
}

impl FromStr for Principal {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "platform-admin" {
            return Ok(Self::PlatformAdmin);
        }
        match s.strip_prefix("seller:") {
            Some(id) => {
                let id = id.parse::<i64>().map_err(|e| ConversionError(format!("Invalid principal '{s}': {e}")))?;
                Ok(Self::Seller(id))
            },
            None => Err(ConversionError(format!("Invalid principal: {s}"))),
        }
    }
}

//--------------------------------------     RefundStatus      -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum RefundStatus {
    Pending,
    Processing,
    Completed,
    /// The processor rejected the reversal. Failed refunds are never retried automatically; a human must
    /// re-submit, since a blind retry of a money reversal risks a duplicate.
    Failed,
    Cancelled,
}

impl Display for RefundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefundStatus::Pending => write!(f, "Pending"),
            RefundStatus::Processing => write!(f, "Processing"),
            RefundStatus::Completed => write!(f, "Completed"),
            RefundStatus::Failed => write!(f, "Failed"),
            RefundStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for RefundStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Processing" => Ok(Self::Processing),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid refund status: {s}"))),
        }
    }
}

//--------------------------------------      RefundKind       -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum RefundKind {
    Full,
    Partial,
}

impl Display for RefundKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefundKind::Full => write!(f, "Full"),
            RefundKind::Partial => write!(f, "Partial"),
        }
    }
}

impl FromStr for RefundKind {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Full" => Ok(Self::Full),
            "Partial" => Ok(Self::Partial),
            s => Err(ConversionError(format!("Invalid refund kind: {s}"))),
        }
    }
}

//--------------------------------------        Refund         -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Refund {
    pub id: i64,
    pub order_id: i64,
    pub amount: Money,
    pub kind: RefundKind,
    pub reason: String,
    /// Stored as `platform` or `seller:<id>`. See [`OwningParty`].
    pub owning_party: String,
    pub status: RefundStatus,
    /// The processor's reversal handle, present once the refund completed.
    pub reversal_id: Option<String>,
    pub requested_by: String,
    pub processed_by: Option<String>,
    pub notes: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Refund {
    pub fn owning_party(&self) -> Result<OwningParty, ConversionError> {
        self.owning_party.parse()
    }
}

#[derive(Debug, Clone)]
pub struct NewRefund {
    pub order_id: i64,
    pub amount: Money,
    pub kind: RefundKind,
    pub reason: String,
    pub owning_party: OwningParty,
    pub requested_by: String,
}
