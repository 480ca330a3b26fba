//! # Split Engine
//!
//! Balance computation and debt-settlement planning for group expense
//! splitting: validate how each expense is split, net every member's
//! position, and suggest the transfers that settle the group.
//!
//! ## Design Principles
//!
//! - **Fixed-point arithmetic**: Uses 2 decimal places via `rust_decimal`
//! - **Write-time validation**: Splits are checked when an expense is created or edited
//! - **Pure computation**: Balances and plans are recomputed from a snapshot, never cached
//! - **Deterministic output**: Balances sorted by member id, ties broken by member id
//!
//! ## Example
//!
//! ```
//! use split_engine::{
//!     plan_settlement, Currency, ExpenseDraft, GroupLedger, Member, Money, SplitInput,
//! };
//!
//! let mut ledger = GroupLedger::new("trip", Currency::new("USD"));
//! for id in ["A", "B", "C"] {
//!     ledger.add_member(Member::new(id, id)).unwrap();
//! }
//! let split = SplitInput::Equal(vec!["A".into(), "B".into(), "C".into()]);
//! ledger
//!     .add_expense(&ExpenseDraft::new("e1", "A", Money::from_minor_units(10000), split))
//!     .unwrap();
//!
//! let balances = ledger.balances().unwrap();
//! assert_eq!(balances[0].amount.to_string(), "66.66");
//!
//! let plan = plan_settlement(&balances).unwrap();
//! assert_eq!(plan.len(), 2);
//! ```

pub mod balance;
pub mod error;
pub mod expense;
pub mod ledger;
pub mod member;
pub mod money;
pub mod payment;
pub mod record;
pub mod settlement;
pub mod split;

pub use balance::{compute_balances, is_group_settled, Balance};
pub use error::{EngineError, PaymentError, Result, SplitError};
pub use expense::{Expense, ExpenseDraft, ParticipantShare, SplitInput, SplitMethod};
pub use ledger::GroupLedger;
pub use member::{Member, MemberId};
pub use money::{Currency, Money};
pub use payment::Payment;
pub use record::{LedgerRecord, LedgerRow};
pub use settlement::{apply_settlements, plan_settlement, Settlement};
