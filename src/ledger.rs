//! In-memory group ledger.
//!
//! Holds one group's current members, expenses and payments: the snapshot
//! the storage layer hands over. Expenses are validated when written (added
//! or edited), so balance computation can trust them. Balances and
//! settlement plans are recomputed from scratch on every call; nothing
//! derived is cached.

use crate::balance::{compute_balances, Balance};
use crate::error::{EngineError, Result};
use crate::expense::{Expense, ExpenseDraft};
use crate::member::{Member, MemberId};
use crate::money::{Currency, Money};
use crate::payment::Payment;
use crate::record::{LedgerRecord, LedgerRow, PendingExpense, PendingShare};
use crate::settlement::{plan_settlement, Settlement};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::io::{Read, Write};

/// A group's expense-sharing ledger.
///
/// # Output Ordering
///
/// Balances are sorted by member id and settlements are listed in the order
/// the planner chose them, so output is reproducible for the same data.
#[derive(Debug, Clone)]
pub struct GroupLedger {
    group_id: String,
    currency: Currency,
    members: Vec<Member>,
    expenses: Vec<Expense>,
    payments: Vec<Payment>,
}

impl GroupLedger {
    /// Creates an empty ledger for a group.
    pub fn new(group_id: impl Into<String>, currency: Currency) -> Self {
        GroupLedger {
            group_id: group_id.into(),
            currency,
            members: Vec::new(),
            expenses: Vec::new(),
            payments: Vec::new(),
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn expenses(&self) -> &[Expense] {
        &self.expenses
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    /// Adds a member. Member ids must be unique within the group.
    pub fn add_member(&mut self, member: Member) -> Result<()> {
        if self.members.iter().any(|m| m.id == member.id) {
            return Err(EngineError::DuplicateMember { member: member.id });
        }
        debug!("Group {}: added member {}", self.group_id, member.id);
        self.members.push(member);
        Ok(())
    }

    /// Validates and stores a new expense.
    pub fn add_expense(&mut self, draft: &ExpenseDraft) -> Result<&Expense> {
        self.ensure_new_id(&draft.id)?;
        let expense = self.build_expense(draft)?;
        debug!(
            "Group {}: recorded expense {} of {} split {} ways by {}",
            self.group_id,
            expense.id,
            expense.total,
            expense.shares.len(),
            expense.method
        );
        self.expenses.push(expense);
        self.expenses
            .last()
            .ok_or_else(|| EngineError::UnknownRecord {
                id: draft.id.clone(),
            })
    }

    /// Replaces an existing expense, re-validating the new split.
    ///
    /// On error the stored expense is left untouched.
    pub fn edit_expense(&mut self, draft: &ExpenseDraft) -> Result<&Expense> {
        let index = self.expense_index(&draft.id)?;
        let expense = self.build_expense(draft)?;
        debug!("Group {}: edited expense {}", self.group_id, expense.id);
        let slot = self
            .expenses
            .get_mut(index)
            .ok_or_else(|| EngineError::UnknownRecord {
                id: draft.id.clone(),
            })?;
        *slot = expense;
        Ok(&*slot)
    }

    /// Deletes an expense so it no longer affects balances.
    pub fn remove_expense(&mut self, id: &str) -> Result<Expense> {
        let index = self.expense_index(id)?;
        debug!("Group {}: removed expense {}", self.group_id, id);
        Ok(self.expenses.remove(index))
    }

    /// Records a direct payment between two members.
    pub fn record_payment(
        &mut self,
        id: &str,
        payer: impl Into<MemberId>,
        recipient: impl Into<MemberId>,
        amount: Money,
    ) -> Result<&Payment> {
        self.ensure_new_id(id)?;
        let payment = Payment::new(
            id,
            self.group_id.clone(),
            payer,
            recipient,
            amount,
            self.currency.clone(),
        )
        .map_err(|reason| {
            warn!("Group {}: rejected payment {}: {}", self.group_id, id, reason);
            EngineError::InvalidPayment {
                payment: id.to_string(),
                reason,
            }
        })?;
        debug!(
            "Group {}: recorded payment {} from {} to {} of {}",
            self.group_id, payment.id, payment.payer, payment.recipient, payment.amount
        );
        self.payments.push(payment);
        self.payments
            .last()
            .ok_or_else(|| EngineError::UnknownRecord { id: id.to_string() })
    }

    /// Deletes a payment so it no longer affects balances.
    pub fn remove_payment(&mut self, id: &str) -> Result<Payment> {
        let index = self
            .payments
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| EngineError::UnknownRecord { id: id.to_string() })?;
        debug!("Group {}: removed payment {}", self.group_id, id);
        Ok(self.payments.remove(index))
    }

    /// Computes fresh balances for every member.
    pub fn balances(&self) -> Result<Vec<Balance>> {
        compute_balances(&self.currency, &self.members, &self.expenses, &self.payments)
    }

    /// Computes fresh balances and plans the transfers that settle them.
    pub fn settlement_plan(&self) -> Result<Vec<Settlement>> {
        plan_settlement(&self.balances()?)
    }

    fn build_expense(&self, draft: &ExpenseDraft) -> Result<Expense> {
        Expense::new(
            draft.id.clone(),
            self.group_id.clone(),
            draft.payer.clone(),
            draft.total,
            self.currency.clone(),
            &draft.split,
        )
        .map_err(|reason| {
            warn!(
                "Group {}: rejected expense {}: {}",
                self.group_id, draft.id, reason
            );
            EngineError::InvalidSplit {
                expense: draft.id.clone(),
                reason,
            }
        })
    }

    fn ensure_new_id(&self, id: &str) -> Result<()> {
        let taken = self.expenses.iter().any(|e| e.id == id)
            || self.payments.iter().any(|p| p.id == id);
        if taken {
            return Err(EngineError::DuplicateRecordId { id: id.to_string() });
        }
        Ok(())
    }

    fn expense_index(&self, id: &str) -> Result<usize> {
        self.expenses
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| EngineError::UnknownRecord { id: id.to_string() })
    }

    /// Loads a ledger from CSV.
    ///
    /// The first data row must be the `group` row. Loading is strict: any
    /// malformed row, invalid split or invalid payment aborts the load, since
    /// a silently dropped record would skew every balance.
    pub fn from_csv<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut ledger: Option<GroupLedger> = None;
        let mut pending: Vec<PendingExpense> = Vec::new();
        let mut pending_index: HashMap<String, usize> = HashMap::new();

        for (row_idx, result) in csv_reader.deserialize::<LedgerRecord>().enumerate() {
            let row = row_idx + 2; // 1-indexed, accounting for header row
            let record = result?;
            let parsed = record
                .parse()
                .map_err(|message| EngineError::InvalidRecord { row, message })?;

            match parsed {
                LedgerRow::Group { id, currency } => {
                    if ledger.is_some() {
                        return Err(EngineError::InvalidRecord {
                            row,
                            message: "duplicate group row".to_string(),
                        });
                    }
                    info!("Loading group {} in {}", id, currency);
                    ledger = Some(GroupLedger::new(id, currency));
                }
                LedgerRow::Member(member) => started(&mut ledger, row)?.add_member(member)?,
                LedgerRow::Expense {
                    id,
                    payer,
                    total,
                    method,
                } => {
                    started(&mut ledger, row)?;
                    if pending_index.contains_key(&id) {
                        return Err(EngineError::DuplicateRecordId { id });
                    }
                    pending_index.insert(id.clone(), pending.len());
                    pending.push(PendingExpense {
                        row,
                        id,
                        payer,
                        total,
                        method,
                        shares: Vec::new(),
                    });
                }
                LedgerRow::Share {
                    expense,
                    member,
                    value,
                } => {
                    started(&mut ledger, row)?;
                    let index = *pending_index.get(&expense).ok_or_else(|| {
                        EngineError::InvalidRecord {
                            row,
                            message: format!("share references unknown expense {}", expense),
                        }
                    })?;
                    pending[index].shares.push(PendingShare { row, member, value });
                }
                LedgerRow::Payment {
                    id,
                    payer,
                    recipient,
                    amount,
                } => {
                    if pending_index.contains_key(&id) {
                        return Err(EngineError::DuplicateRecordId { id });
                    }
                    started(&mut ledger, row)?.record_payment(&id, payer, recipient, amount)?;
                }
            }
        }

        let mut ledger = ledger.ok_or_else(|| EngineError::InvalidRecord {
            row: 1,
            message: "missing group row".to_string(),
        })?;

        for expense in pending {
            debug!("Row {}: assembling expense {}", expense.row, expense.id);
            let draft = expense.into_draft()?;
            ledger.add_expense(&draft)?;
        }

        info!(
            "Loaded group {}: {} members, {} expenses, {} payments",
            ledger.group_id,
            ledger.members.len(),
            ledger.expenses.len(),
            ledger.payments.len()
        );
        Ok(ledger)
    }

    /// Writes current balances, a blank line, then the settlement plan as CSV.
    ///
    /// All monetary values are formatted with exactly 2 decimal places.
    pub fn write_output<W: Write>(&self, mut writer: W) -> Result<()> {
        let balances = self.balances()?;
        let settlements = plan_settlement(&balances)?;

        {
            let mut csv_writer = WriterBuilder::new()
                .has_headers(false)
                .from_writer(&mut writer);
            csv_writer.write_record(["member", "name", "amount", "currency"])?;
            for balance in &balances {
                csv_writer.serialize(balance)?;
            }
            csv_writer.flush()?;
        }

        writer.write_all(b"\n")?;

        {
            let mut csv_writer = WriterBuilder::new()
                .has_headers(false)
                .from_writer(&mut writer);
            csv_writer.write_record([
                "payer",
                "payer_name",
                "recipient",
                "recipient_name",
                "amount",
                "currency",
            ])?;
            for settlement in &settlements {
                csv_writer.serialize(settlement)?;
            }
            csv_writer.flush()?;
        }

        Ok(())
    }
}

/// Returns the ledger opened by the `group` row, or an error for `row`.
fn started(ledger: &mut Option<GroupLedger>, row: usize) -> Result<&mut GroupLedger> {
    ledger.as_mut().ok_or_else(|| EngineError::InvalidRecord {
        row,
        message: "ledger must start with a group row".to_string(),
    })
}
