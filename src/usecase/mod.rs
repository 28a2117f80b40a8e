mod fulfill_order;
mod lookup_voucher;
mod request_voucher;
mod seed_campaign;

pub use fulfill_order::{
    run_fulfillment_loop, FulfillOutcome, OrderFulfillUcError, OrderFulfillUseCase,
};
pub use lookup_voucher::{VoucherLookupUcError, VoucherLookupUseCase};
pub use request_voucher::{VoucherRequestUcError, VoucherRequestUseCase};
pub use seed_campaign::{CampaignSeedUcError, CampaignSeedUseCase};
