use crate as pallet_htlc;
use frame_support::{derive_impl, parameter_types, traits::{ConstU32, ConstU64}, PalletId};
use sp_runtime::{traits::IdentityLookup, BuildStorage};

pub type AccountId = u64;
pub type AssetId = u32;
pub type Balance = u128;
pub type Moment = u64;

type Block = frame_system::mocking::MockBlock<Test>;

#[frame_support::runtime]
mod runtime {
    #[runtime::runtime]
    #[runtime::derive(
        RuntimeCall,
        RuntimeEvent,
        RuntimeError,
        RuntimeOrigin,
        RuntimeFreezeReason,
        RuntimeHoldReason,
        RuntimeSlashReason,
        RuntimeLockId,
        RuntimeTask
    )]
    pub struct Test;

    #[runtime::pallet_index(0)]
    pub type System = frame_system::Pallet<Test>;
    #[runtime::pallet_index(1)]
    pub type Timestamp = pallet_timestamp::Pallet<Test>;
    #[runtime::pallet_index(2)]
    pub type Balances = pallet_balances::Pallet<Test>;
    #[runtime::pallet_index(3)]
    pub type Assets = pallet_assets::Pallet<Test>;
    #[runtime::pallet_index(4)]
    pub type Htlc = pallet_htlc::Pallet<Test>;
}

#[derive_impl(frame_system::config_preludes::TestDefaultConfig)]
impl frame_system::Config for Test {
    type Block = Block;
    type AccountId = AccountId;
    type Lookup = IdentityLookup<AccountId>;
    type AccountData = pallet_balances::AccountData<Balance>;
}

impl pallet_timestamp::Config for Test {
    type Moment = Moment;
    type OnTimestampSet = ();
    type MinimumPeriod = ConstU64<1>;
    type WeightInfo = ();
}

parameter_types! {
    pub const ExistentialDeposit: Balance = 1;
}

#[derive_impl(pallet_balances::config_preludes::TestDefaultConfig)]
impl pallet_balances::Config for Test {
    type RuntimeEvent = RuntimeEvent;
    type Balance = Balance;
    type ExistentialDeposit = ExistentialDeposit;
    type AccountStore = System;
}

parameter_types! {
    pub const AssetDeposit: Balance = 0;
    pub const AssetAccountDeposit: Balance = 0;
    pub const MetadataDepositBase: Balance = 0;
    pub const MetadataDepositPerByte: Balance = 0;
    pub const ApprovalDeposit: Balance = 0;
    pub const StringLimit: u32 = 50;
    pub const RemoveItemsLimit: u32 = 1000;
}

impl pallet_assets::Config for Test {
    type RuntimeEvent = RuntimeEvent;
    type Balance = Balance;
    type AssetId = AssetId;
    type AssetIdParameter = AssetId;
    type Currency = Balances;
    type CreateOrigin = frame_support::traits::AsEnsureOriginWithArg<frame_system::EnsureSigned<AccountId>>;
    type ForceOrigin = frame_system::EnsureRoot<AccountId>;
    type AssetDeposit = AssetDeposit;
    type AssetAccountDeposit = AssetAccountDeposit;
    type MetadataDepositBase = MetadataDepositBase;
    type MetadataDepositPerByte = MetadataDepositPerByte;
    type ApprovalDeposit = ApprovalDeposit;
    type StringLimit = StringLimit;
    type Freezer = ();
    type Holder = ();
    type Extra = ();
    type WeightInfo = ();
    type RemoveItemsLimit = RemoveItemsLimit;
    type CallbackHandle = ();
}

parameter_types! {
    pub const HtlcPalletId: PalletId = PalletId(*b"py/htlcs");
}

impl pallet_htlc::Config for Test {
    type RuntimeEvent = RuntimeEvent;
    type AssetId = AssetId;
    type AssetBalance = Balance;
    type Assets = Assets;
    type UnixTime = Timestamp;
    type PalletId = HtlcPalletId;
    type MaxDenominations = ConstU32<8>;
    type MaxSecretLength = ConstU32<256>;
    type MaxMerkleProofLength = ConstU32<32>;
    type MaxExternalTagLen = ConstU32<32>;
    type MaxExternalIdLen = ConstU32<64>;
}

/// The single asset id used across tests, created in genesis with Alice as owner/admin.
pub const XOR: AssetId = 1;
pub const ALICE: AccountId = 1;
pub const BOB: AccountId = 2;
pub const CAROL: AccountId = 3;

pub fn new_test_ext() -> sp_io::TestExternalities {
    let mut storage = frame_system::GenesisConfig::<Test>::default().build_storage().unwrap();

    pallet_balances::GenesisConfig::<Test> {
        balances: vec![(ALICE, 10_000_000), (BOB, 10_000_000), (CAROL, 10_000_000)],
        ..Default::default()
    }
    .assimilate_storage(&mut storage)
    .unwrap();

    let mut ext = sp_io::TestExternalities::new(storage);
    ext.execute_with(|| {
        System::set_block_number(1);
        Timestamp::set_timestamp(1_700_000_000_000);

        Assets::force_create(RuntimeOrigin::root(), XOR, ALICE, true, 1).unwrap();
        Assets::mint(RuntimeOrigin::signed(ALICE), XOR, ALICE, 1_000_000).unwrap();
        Assets::mint(RuntimeOrigin::signed(ALICE), XOR, BOB, 1_000_000).unwrap();
        Assets::mint(RuntimeOrigin::signed(ALICE), XOR, CAROL, 1_000_000).unwrap();
    });
    ext
}
