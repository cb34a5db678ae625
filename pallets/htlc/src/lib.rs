#![cfg_attr(not(feature = "std"), no_std)]

//! # Hashed Time-Locked Contract pallet
//!
//! Escrows a multi-denomination balance so it can be atomically swapped
//! against an out-of-band commitment (typically a matching contract on a
//! remote ledger). Value is released to exactly one of two destinations:
//! the receiver, by revealing a preimage of a published hash before
//! expiry, or back to the sender, by refund after expiry.
//!
//! Two commitment modes are supported. In single-secret mode one preimage
//! unlocks the full amount. In Merkle mode a committed root admits several
//! independent partial claims, one per leaf, each paying out an equal
//! share of the escrowed amount.

#[cfg(test)]
mod mock;

pub use pallet::*;

/// SHA-256 hashing and sorted-pair Merkle proof verification.
///
/// Kept outside the `#[frame_support::pallet]` module because it needs no
/// storage access and is useful to unit-test in isolation.
pub mod crypto {
    use sp_core::H256;
    use sp_io::hashing::sha2_256;
    use sp_std::vec::Vec;

    /// `SHA-256(preimage)`.
    pub fn sha256(preimage: &[u8]) -> H256 {
        H256::from(sha2_256(preimage))
    }

    /// Folds `leaf` through `proof` using sorted-pair concatenation and
    /// compares the result to `root`. An empty proof is valid iff
    /// `leaf == root`.
    pub fn verify_merkle(leaf: H256, proof: &[H256], root: H256) -> bool {
        let mut acc = leaf;
        for sibling in proof {
            let mut buf = Vec::with_capacity(64);
            if acc.as_bytes() <= sibling.as_bytes() {
                buf.extend_from_slice(acc.as_bytes());
                buf.extend_from_slice(sibling.as_bytes());
            } else {
                buf.extend_from_slice(sibling.as_bytes());
                buf.extend_from_slice(acc.as_bytes());
            }
            acc = sha256(&buf);
        }
        acc == root
    }
}

#[frame_support::pallet]
pub mod pallet {
    use super::crypto;
    use codec::{Decode, Encode, MaxEncodedLen};
    use frame_support::{
        pallet_prelude::*,
        traits::{
            tokens::{fungibles, Preservation},
            UnixTime,
        },
        PalletId,
    };
    use frame_system::pallet_prelude::*;
    use scale_info::TypeInfo;
    use sp_core::H256;
    use sp_runtime::traits::{AccountIdConversion, AtLeast32BitUnsigned, One, Zero};
    use sp_std::vec::Vec;

    pub type AssetIdOf<T> = <T as Config>::AssetId;
    pub type AssetBalanceOf<T> = <T as Config>::AssetBalance;
    /// An HTLC's locked value: a non-empty, bounded list of (asset, amount)
    /// components, each strictly positive (enforced by `validate::create`).
    pub type Amount<T> = BoundedVec<(AssetIdOf<T>, AssetBalanceOf<T>), <T as Config>::MaxDenominations>;
    /// Content-addressed HTLC identifier (see `Pallet::derive_id`).
    pub type HtlcId = H256;

    const STORAGE_VERSION: StorageVersion = StorageVersion::new(1);

    #[pallet::pallet]
    #[pallet::storage_version(STORAGE_VERSION)]
    pub struct Pallet<T>(_);

    #[pallet::config]
    pub trait Config: frame_system::Config {
        /// Because this pallet emits events, it depends on the runtime's definition of an event.
        type RuntimeEvent: From<Event<Self>> + IsType<<Self as frame_system::Config>::RuntimeEvent>;

        /// Asset identifier type understood by `Assets`.
        type AssetId: Member + Parameter + MaxEncodedLen + Copy;

        /// Balance type understood by `Assets`.
        type AssetBalance: Member + Parameter + MaxEncodedLen + Copy + AtLeast32BitUnsigned;

        /// Multi-asset custody backend. `move_to_escrow`/`move_from_escrow`
        /// (spec §6.1) are built on top of this as per-component transfers
        /// to/from the pallet's sovereign account.
        type Assets: fungibles::Inspect<Self::AccountId, AssetId = Self::AssetId, Balance = Self::AssetBalance>
            + fungibles::Mutate<Self::AccountId, AssetId = Self::AssetId, Balance = Self::AssetBalance>;

        /// Deterministic wall-clock reading, identical across replicas at a
        /// given block (spec §5, "block time").
        type UnixTime: UnixTime;

        /// Module account id used to derive the escrow sovereign account.
        #[pallet::constant]
        type PalletId: Get<PalletId>;

        /// Maximum number of distinct asset components in a single `amount`.
        #[pallet::constant]
        type MaxDenominations: Get<u32>;

        /// Maximum byte length of a claim secret.
        #[pallet::constant]
        type MaxSecretLength: Get<u32>;

        /// Maximum number of sibling hashes in a Merkle proof.
        #[pallet::constant]
        type MaxMerkleProofLength: Get<u32>;

        /// Maximum byte length of the `external_chain` tag.
        #[pallet::constant]
        type MaxExternalTagLen: Get<u32>;

        /// Maximum byte length of the `external_id` tag.
        #[pallet::constant]
        type MaxExternalIdLen: Get<u32>;
    }

    /// The on-chain HTLC record (spec §3.1). `merkle_root != 0` selects
    /// Merkle mode; otherwise `hash_lock` is the single-secret lock.
    #[derive(Encode, Decode, Clone, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
    #[scale_info(skip_type_params(T))]
    pub struct HtlcRecord<T: Config> {
        pub sender: T::AccountId,
        pub receiver: T::AccountId,
        pub amount: Amount<T>,
        pub hash_lock: H256,
        pub merkle_root: H256,
        /// Committed leaf count. Zero in single-secret mode, `>= 2` in Merkle mode.
        pub fan_out: u32,
        /// `|used_secrets|`, cached so `claimed` can be derived in O(1).
        pub used_count: u32,
        pub time_lock: u64,
        pub claimed: bool,
        pub refunded: bool,
        pub external_chain: Option<BoundedVec<u8, T::MaxExternalTagLen>>,
        pub external_id: Option<BoundedVec<u8, T::MaxExternalIdLen>>,
    }

    impl<T: Config> HtlcRecord<T> {
        pub fn is_merkle_mode(&self) -> bool {
            self.merkle_root != H256::default()
        }

        pub fn is_active(&self) -> bool {
            !self.claimed && !self.refunded
        }
    }

    #[pallet::storage]
    #[pallet::getter(fn htlc)]
    pub type Htlcs<T: Config> = StorageMap<_, Blake2_128Concat, HtlcId, HtlcRecord<T>, OptionQuery>;

    /// Secrets already redeemed against a given Merkle-mode HTLC. Kept as a
    /// separate map, rather than embedded in `HtlcRecord`, so a partially
    /// claimed HTLC does not require re-encoding a growing set on every
    /// write (the source's `map[string]bool` field does not scale this way).
    #[pallet::storage]
    pub type UsedSecrets<T: Config> = StorageDoubleMap<
        _,
        Blake2_128Concat,
        HtlcId,
        Blake2_128Concat,
        BoundedVec<u8, T::MaxSecretLength>,
        (),
        OptionQuery,
    >;

    #[pallet::event]
    #[pallet::generate_deposit(pub(super) fn deposit_event)]
    pub enum Event<T: Config> {
        /// A new HTLC was created and its amount escrowed.
        HtlcCreated {
            id: HtlcId,
            sender: T::AccountId,
            receiver: T::AccountId,
            amount: Amount<T>,
            hash_lock: H256,
            merkle_root: H256,
            time_lock: u64,
            external_chain: Option<BoundedVec<u8, T::MaxExternalTagLen>>,
            external_id: Option<BoundedVec<u8, T::MaxExternalIdLen>>,
        },
        /// A preimage was revealed and its share paid out.
        HtlcClaimed {
            id: HtlcId,
            claimer: T::AccountId,
            secret: Vec<u8>,
            leaf: H256,
            remaining_unused: u32,
        },
        /// An expired HTLC was refunded to its sender.
        HtlcRefunded { id: HtlcId, sender: T::AccountId, amount: Amount<T> },
    }

    #[pallet::error]
    pub enum Error<T> {
        /// Basic request validation failed (empty field, bad digest length,
        /// non-positive amount, malformed lock selection).
        MalformedRequest,
        /// No HTLC exists at the given id.
        NotFound,
        /// The HTLC is already claimed or refunded.
        AlreadyTerminal,
        /// Caller is not the HTLC's receiver (claim) or sender (refund).
        NotAuthorized,
        /// Hash mismatch, invalid Merkle proof, or secret already used.
        BadPreimage,
        /// Claim attempted after expiry, or refund attempted before expiry.
        TimingViolation,
        /// The asset transfer backing this transition failed.
        CustodyFailure,
        /// Refund of a Merkle-mode HTLC with at least one partial claim
        /// already recorded is not supported.
        PartialClaimBlocksRefund,
    }

    mod validate {
        use super::*;

        pub fn create<T: Config>(
            amount: &Amount<T>,
            hash_lock: H256,
            merkle_root: H256,
            fan_out: u32,
            time_lock: u64,
            now: u64,
        ) -> Result<(), Error<T>> {
            ensure!(!amount.is_empty(), Error::<T>::MalformedRequest);
            for (_, balance) in amount.iter() {
                ensure!(!balance.is_zero(), Error::<T>::MalformedRequest);
            }

            let single = hash_lock != H256::default();
            let merkle = merkle_root != H256::default();
            ensure!(single != merkle, Error::<T>::MalformedRequest);
            if merkle {
                ensure!(fan_out >= 2, Error::<T>::MalformedRequest);
            } else {
                ensure!(fan_out == 0, Error::<T>::MalformedRequest);
            }

            ensure!(time_lock > now, Error::<T>::MalformedRequest);
            Ok(())
        }

        pub fn claim<T: Config>(secret: &[u8]) -> Result<(), Error<T>> {
            ensure!(!secret.is_empty(), Error::<T>::MalformedRequest);
            Ok(())
        }
    }

    #[pallet::call]
    impl<T: Config> Pallet<T> {
        /// Create an HTLC, escrowing `amount` from the caller.
        #[pallet::call_index(0)]
        #[pallet::weight(T::DbWeight::get().reads_writes(2, 2))]
        pub fn create(
            origin: OriginFor<T>,
            receiver: T::AccountId,
            amount: Amount<T>,
            hash_lock: H256,
            merkle_root: H256,
            fan_out: u32,
            time_lock: u64,
            external_chain: Option<BoundedVec<u8, T::MaxExternalTagLen>>,
            external_id: Option<BoundedVec<u8, T::MaxExternalIdLen>>,
        ) -> DispatchResult {
            let sender = ensure_signed(origin)?;

            let now = T::UnixTime::now().as_secs();
            validate::create::<T>(&amount, hash_lock, merkle_root, fan_out, time_lock, now)?;

            let id = Self::derive_id(&sender, &receiver, hash_lock, merkle_root, time_lock, &amount, now);
            // Content-addressed, so a collision here means a byte-identical request was
            // already committed this block; treated as malformed rather than silently
            // accepted twice.
            ensure!(!Htlcs::<T>::contains_key(id), Error::<T>::MalformedRequest);

            Self::move_to_escrow(&sender, &amount)?;

            let record = HtlcRecord::<T> {
                sender: sender.clone(),
                receiver: receiver.clone(),
                amount: amount.clone(),
                hash_lock,
                merkle_root,
                fan_out,
                used_count: 0,
                time_lock,
                claimed: false,
                refunded: false,
                external_chain: external_chain.clone(),
                external_id: external_id.clone(),
            };
            Htlcs::<T>::insert(id, record);

            log::debug!(target: "runtime::htlc", "created {:?}: {:?} -> {:?}", id, sender, receiver);

            Self::deposit_event(Event::HtlcCreated {
                id,
                sender,
                receiver,
                amount,
                hash_lock,
                merkle_root,
                time_lock,
                external_chain,
                external_id,
            });
            Ok(())
        }

        /// Claim an HTLC by revealing a preimage of its lock.
        #[pallet::call_index(1)]
        #[pallet::weight(T::DbWeight::get().reads_writes(3, 3))]
        pub fn claim(
            origin: OriginFor<T>,
            id: HtlcId,
            secret: BoundedVec<u8, T::MaxSecretLength>,
            merkle_proof: BoundedVec<H256, T::MaxMerkleProofLength>,
        ) -> DispatchResult {
            let claimer = ensure_signed(origin)?;
            validate::claim::<T>(&secret)?;

            let mut record = Htlcs::<T>::get(id).ok_or(Error::<T>::NotFound)?;
            ensure!(record.is_active(), Error::<T>::AlreadyTerminal);

            let now = T::UnixTime::now().as_secs();
            ensure!(now <= record.time_lock, Error::<T>::TimingViolation);
            ensure!(claimer == record.receiver, Error::<T>::NotAuthorized);

            let leaf = crypto::sha256(&secret);
            let payout: Vec<(AssetIdOf<T>, AssetBalanceOf<T>)>;
            let remaining_unused;

            if record.is_merkle_mode() {
                ensure!(
                    crypto::verify_merkle(leaf, &merkle_proof, record.merkle_root),
                    Error::<T>::BadPreimage
                );
                ensure!(!UsedSecrets::<T>::contains_key(id, &secret), Error::<T>::BadPreimage);

                UsedSecrets::<T>::insert(id, &secret, ());
                record.used_count = record.used_count.saturating_add(1);
                let is_last = record.used_count == record.fan_out;
                payout = Self::split_share(&record.amount, record.fan_out, is_last);
                record.claimed = is_last;
                remaining_unused = record.fan_out.saturating_sub(record.used_count);
            } else {
                ensure!(leaf == record.hash_lock, Error::<T>::BadPreimage);
                payout = record.amount.to_vec();
                record.claimed = true;
                remaining_unused = 0;
            }

            Self::move_from_escrow(&claimer, &payout)?;
            Htlcs::<T>::insert(id, &record);

            log::debug!(target: "runtime::htlc", "{:?} claimed by {:?}", id, claimer);

            Self::deposit_event(Event::HtlcClaimed {
                id,
                claimer,
                secret: secret.to_vec(),
                leaf,
                remaining_unused,
            });
            Ok(())
        }

        /// Refund an expired, still-Active HTLC back to its sender.
        #[pallet::call_index(2)]
        #[pallet::weight(T::DbWeight::get().reads_writes(2, 2))]
        pub fn refund(origin: OriginFor<T>, id: HtlcId) -> DispatchResult {
            let sender = ensure_signed(origin)?;

            let mut record = Htlcs::<T>::get(id).ok_or(Error::<T>::NotFound)?;
            ensure!(record.is_active(), Error::<T>::AlreadyTerminal);

            let now = T::UnixTime::now().as_secs();
            ensure!(now > record.time_lock, Error::<T>::TimingViolation);
            ensure!(sender == record.sender, Error::<T>::NotAuthorized);
            ensure!(record.used_count == 0, Error::<T>::PartialClaimBlocksRefund);

            Self::move_from_escrow(&sender, &record.amount.to_vec())?;
            record.refunded = true;
            Htlcs::<T>::insert(id, &record);

            log::debug!(target: "runtime::htlc", "{:?} refunded to {:?}", id, sender);

            Self::deposit_event(Event::HtlcRefunded { id, sender, amount: record.amount.clone() });
            Ok(())
        }
    }

    impl<T: Config> Pallet<T> {
        /// The escrow module account: every non-terminal HTLC's `amount` is
        /// held here between creation and claim/refund.
        pub fn sovereign_account() -> T::AccountId {
            T::PalletId::get().into_account_truncating()
        }

        /// All HTLCs where `account` is sender or receiver. For read-only
        /// query surfaces (CLI/RPC); not used by the state machine itself.
        pub fn htlcs_for(account: &T::AccountId) -> Vec<(HtlcId, HtlcRecord<T>)> {
            Htlcs::<T>::iter().filter(|(_, r)| &r.sender == account || &r.receiver == account).collect()
        }

        /// Content-addressed id derivation (spec §4.3). Deterministic across
        /// replicas; does not depend on request arrival order, unlike the
        /// source's `sender ++ block_time.String()` scheme.
        fn derive_id(
            sender: &T::AccountId,
            receiver: &T::AccountId,
            hash_lock: H256,
            merkle_root: H256,
            time_lock: u64,
            amount: &Amount<T>,
            block_time: u64,
        ) -> HtlcId {
            let mut buf = Vec::new();
            buf.extend_from_slice(&sender.encode());
            buf.extend_from_slice(&receiver.encode());
            buf.extend_from_slice(hash_lock.as_bytes());
            buf.extend_from_slice(merkle_root.as_bytes());
            buf.extend_from_slice(&time_lock.to_be_bytes());
            buf.extend_from_slice(&amount.encode());
            buf.extend_from_slice(&block_time.to_be_bytes());
            crypto::sha256(&buf)
        }

        /// Equal per-leaf share of `amount`, component-wise. The claim that
        /// brings `used_count` to `fan_out` also receives the remainder left
        /// by floor division, so the sum of all payouts equals `amount`
        /// exactly (the custody invariant must hold component-by-component).
        fn split_share(amount: &Amount<T>, fan_out: u32, is_last: bool) -> Vec<(AssetIdOf<T>, AssetBalanceOf<T>)> {
            let n: AssetBalanceOf<T> = fan_out.into();
            amount
                .iter()
                .map(|(asset, balance)| {
                    let share = *balance / n;
                    let paid = if is_last {
                        *balance - share * (n - AssetBalanceOf::<T>::one())
                    } else {
                        share
                    };
                    (*asset, paid)
                })
                .collect()
        }

        fn move_to_escrow(sender: &T::AccountId, amount: &Amount<T>) -> DispatchResult {
            let escrow = Self::sovereign_account();
            for (asset, balance) in amount.iter() {
                T::Assets::transfer(*asset, sender, &escrow, *balance, Preservation::Expendable)
                    .map_err(|_| Error::<T>::CustodyFailure)?;
            }
            Ok(())
        }

        fn move_from_escrow(
            recipient: &T::AccountId,
            amount: &[(AssetIdOf<T>, AssetBalanceOf<T>)],
        ) -> DispatchResult {
            let escrow = Self::sovereign_account();
            for (asset, balance) in amount.iter() {
                if balance.is_zero() {
                    continue;
                }
                T::Assets::transfer(*asset, &escrow, recipient, *balance, Preservation::Expendable)
                    .map_err(|_| Error::<T>::CustodyFailure)?;
            }
            Ok(())
        }
    }
}
