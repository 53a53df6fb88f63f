//! Deposit ledger, validator groups and reward distribution
//!
//! Deterministic state-transition core for staking: accounts lock funds to
//! qualify as miners or validators, validator groups pool many depositors
//! behind one signing identity, and rewards, interest and slashes are split
//! proportionally without losing or fabricating value.
//!
//! ## Architecture
//!
//! ```text
//!            abi::Executor  (decode, snapshot, value transfer, revert)
//!             │                          │
//!             ▼                          ▼
//!      DepositLedger ◄──────── ValidatorGroupLedger ──► distribution
//!       │         │               (composition)           (pro-rata)
//!       ▼         ▼                                          ▲
//!  PositionPolicy  record                 InterestEngine ────┘
//!  (current/fixed)  (DepositBase)          (accrue + settle)
//!             │
//!             ▼
//!        StateStore  (bincode blobs keyed address ++ tag)
//! ```
//!
//! ## Properties
//!
//! - Every operation loads whole records, mutates copies and writes them back
//! - Block time is always supplied by the caller
//! - Every "list all" view iterates a sorted index
//! - Amounts are checked 256-bit integers

pub mod abi;
pub mod config;
pub mod context;
pub mod deposit;
pub mod distribution;
pub mod error;
pub mod group;
pub mod interest;
pub mod policy;
pub mod record;
pub mod sorted;
pub mod state;
pub mod types;

pub use abi::{DepositCall, Executor, GroupCall, SUCCESS};
pub use config::{InterestConfig, LedgerConfig};
pub use context::CallContext;
pub use deposit::{DepositLedger, RoleIndex};
pub use distribution::{distribute_amount, pro_rata, Distribution, LevelRate, PoolMember, RewardRate};
pub use error::{LedgerError, Result};
pub use group::{CurrentData, DepositPos, GroupState, OwnerInfo, ValidatorGroupLedger, ValidatorInfo};
pub use interest::{InterestEngine, InterestReport, PositionAccrual};
pub use policy::{CurrentTerms, PolicyTable, PositionPolicy, RegularTerms};
pub use record::{DepositBase, DepositMsg, Role, WithdrawInfo, CURRENT_POSITION, CURRENT_TYPE};
pub use sorted::{SortKey, SortedVec};
pub use state::{MemoryState, StateStore};
pub use types::{Address, BlockNumber, RateBps, Timestamp, U256};
