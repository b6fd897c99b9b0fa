use codec::{Decode, Encode, MaxEncodedLen};
use scale_info::TypeInfo;
use shp_types::{Balance, StorageDataUnit, TickNumber};

/// Structure that has the Fixed-Rate Payment Stream information
#[derive(Encode, Decode, TypeInfo, Debug, PartialEq, Eq, Clone, MaxEncodedLen)]
pub struct FixedRatePaymentStream {
    /// The amount charged per tick.
    pub rate: Balance,
    /// The last tick up to which the User was charged.
    pub last_charged_tick: TickNumber,
    /// The deposit held from the User when the stream was opened.
    pub user_deposit: Balance,
    /// The tick at which the User first failed to pay this stream, if it did.
    pub out_of_funds_tick: Option<TickNumber>,
}

/// Structure that has the Dynamic-Rate Payment Stream information
#[derive(Encode, Decode, TypeInfo, Debug, PartialEq, Eq, Clone, MaxEncodedLen)]
pub struct DynamicRatePaymentStream {
    /// The amount of storage the Provider holds for the User.
    pub amount_provided: StorageDataUnit,
    /// The accumulated price index up to which the User was charged.
    pub price_index_when_last_charged: Balance,
    pub user_deposit: Balance,
    pub out_of_funds_tick: Option<TickNumber>,
}

/// How far a Provider can charge its payment streams.
///
/// Updated every time the Provider submits a valid proof: a Provider is only paid for the time it
/// proved it was storing the data.
#[derive(Encode, Decode, TypeInfo, Debug, PartialEq, Eq, Clone, Copy, Default, MaxEncodedLen)]
pub struct ProviderLastChargeableInfo {
    pub last_chargeable_tick: TickNumber,
    pub price_index: Balance,
}

/// Outcome of charging a single payment stream.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct ChargeOutcome {
    /// Amount transferred from the User to the Provider.
    pub charged: Balance,
    /// Amount owed that the User could not pay.
    pub unpaid: Balance,
}

impl ChargeOutcome {
    pub fn merge(self, other: ChargeOutcome) -> ChargeOutcome {
        ChargeOutcome {
            charged: self.charged.saturating_add(other.charged),
            unpaid: self.unpaid.saturating_add(other.unpaid),
        }
    }
}
