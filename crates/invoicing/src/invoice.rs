use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stagebill_core::{Aggregate, AggregateId, AggregateRoot, DomainError, OrganizationId, UserId};
use stagebill_events::Event;
use stagebill_projects::{PhaseId, ProjectId};

use crate::ledger::{
    InvoiceTotals, LineItem, LineItemDraft, ensure_representable, recompute_totals,
    validate_tax_rate,
};
use crate::lifecycle::{InvoiceStatus, transition};
use crate::number::InvoiceNumber;
use crate::payment::{Payment, check_payment};
use crate::snapshot::InvoiceSnapshot;

/// Invoice identifier (organization-scoped via `organization_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Client (bill-to party). Client records live outside this system.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub AggregateId);

impl ClientId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ClientId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Fields fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
struct InvoiceHeader {
    organization_id: OrganizationId,
    invoice_number: InvoiceNumber,
    project_id: ProjectId,
    phase_id: Option<PhaseId>,
    client_id: ClientId,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    created_by: UserId,
}

/// Aggregate root: Invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    id: InvoiceId,
    header: Option<InvoiceHeader>,
    status: InvoiceStatus,
    items: Vec<LineItem>,
    next_line_no: u32,
    tax_rate: Decimal,
    totals: InvoiceTotals,
    last_payment_date: Option<NaiveDate>,
    version: u64,
}

impl Invoice {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            header: None,
            status: InvoiceStatus::Draft,
            items: Vec::new(),
            next_line_no: 1,
            tax_rate: Decimal::ZERO,
            totals: InvoiceTotals::default(),
            last_payment_date: None,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.header.is_some()
    }

    pub fn organization_id(&self) -> Option<OrganizationId> {
        self.header.as_ref().map(|h| h.organization_id)
    }

    pub fn invoice_number(&self) -> Option<&InvoiceNumber> {
        self.header.as_ref().map(|h| &h.invoice_number)
    }

    pub fn project_id(&self) -> Option<ProjectId> {
        self.header.as_ref().map(|h| h.project_id)
    }

    pub fn phase_id(&self) -> Option<PhaseId> {
        self.header.as_ref().and_then(|h| h.phase_id)
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.header.as_ref().map(|h| h.client_id)
    }

    pub fn issue_date(&self) -> Option<NaiveDate> {
        self.header.as_ref().map(|h| h.issue_date)
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.header.as_ref().map(|h| h.due_date)
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.header.as_ref().map(|h| h.created_by)
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn item(&self, line_no: u32) -> Option<&LineItem> {
        self.items.iter().find(|i| i.line_no() == line_no)
    }

    pub fn tax_rate(&self) -> Decimal {
        self.tax_rate
    }

    pub fn totals(&self) -> &InvoiceTotals {
        &self.totals
    }

    pub fn last_payment_date(&self) -> Option<NaiveDate> {
        self.last_payment_date
    }

    /// True when a sweep run on `today` would move this invoice to Overdue.
    pub fn is_past_due(&self, today: NaiveDate) -> bool {
        self.status.is_awaiting_payment() && self.due_date().is_some_and(|due| today > due)
    }

    /// Read view of the current state. `NotFound` before creation.
    pub fn snapshot(&self) -> Result<InvoiceSnapshot, DomainError> {
        InvoiceSnapshot::from_invoice(self)
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInvoice {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub invoice_number: InvoiceNumber,
    pub project_id: ProjectId,
    pub phase_id: Option<PhaseId>,
    pub client_id: ClientId,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub tax_rate: Decimal,
    pub items: Vec<LineItemDraft>,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLineItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLineItem {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub item: LineItemDraft,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateLineItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLineItem {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub line_no: u32,
    pub item: LineItemDraft,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveLineItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLineItem {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetTaxRate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetTaxRate {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub tax_rate: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkSent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkSent {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkViewed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkViewed {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelInvoice {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub actor_id: UserId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SweepOverdue. A no-op unless the invoice is awaiting payment and
/// `today` is past its due date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepOverdue {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub today: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApplyPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyPayment {
    pub organization_id: OrganizationId,
    pub payment: Payment,
    pub today: NaiveDate,
    pub recorded_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    CreateInvoice(CreateInvoice),
    AddLineItem(AddLineItem),
    UpdateLineItem(UpdateLineItem),
    RemoveLineItem(RemoveLineItem),
    SetTaxRate(SetTaxRate),
    MarkSent(MarkSent),
    MarkViewed(MarkViewed),
    CancelInvoice(CancelInvoice),
    SweepOverdue(SweepOverdue),
    ApplyPayment(ApplyPayment),
}

impl InvoiceCommand {
    /// Stream the command targets.
    pub fn invoice_id(&self) -> InvoiceId {
        match self {
            InvoiceCommand::CreateInvoice(c) => c.invoice_id,
            InvoiceCommand::AddLineItem(c) => c.invoice_id,
            InvoiceCommand::UpdateLineItem(c) => c.invoice_id,
            InvoiceCommand::RemoveLineItem(c) => c.invoice_id,
            InvoiceCommand::SetTaxRate(c) => c.invoice_id,
            InvoiceCommand::MarkSent(c) => c.invoice_id,
            InvoiceCommand::MarkViewed(c) => c.invoice_id,
            InvoiceCommand::CancelInvoice(c) => c.invoice_id,
            InvoiceCommand::SweepOverdue(c) => c.invoice_id,
            InvoiceCommand::ApplyPayment(c) => c.payment.invoice_id,
        }
    }
}

/// Event: InvoiceCreated. Items follow as `LineItemAdded` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCreated {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub invoice_number: InvoiceNumber,
    pub project_id: ProjectId,
    pub phase_id: Option<PhaseId>,
    pub client_id: ClientId,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub tax_rate: Decimal,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineItemAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemAdded {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub line_no: u32,
    pub item: LineItemDraft,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineItemUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemUpdated {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub line_no: u32,
    pub item: LineItemDraft,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineItemRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemRemoved {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TaxRateChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRateChanged {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub tax_rate: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceSent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSent {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub sent_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceViewed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceViewed {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceMarkedOverdue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceMarkedOverdue {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub as_of: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentApplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentApplied {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub recorded_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCancelled {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub cancelled_by: UserId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceCreated(InvoiceCreated),
    LineItemAdded(LineItemAdded),
    LineItemUpdated(LineItemUpdated),
    LineItemRemoved(LineItemRemoved),
    TaxRateChanged(TaxRateChanged),
    InvoiceSent(InvoiceSent),
    InvoiceViewed(InvoiceViewed),
    InvoiceMarkedOverdue(InvoiceMarkedOverdue),
    PaymentApplied(PaymentApplied),
    InvoiceCancelled(InvoiceCancelled),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceCreated(_) => "invoicing.invoice.created",
            InvoiceEvent::LineItemAdded(_) => "invoicing.invoice.line_item_added",
            InvoiceEvent::LineItemUpdated(_) => "invoicing.invoice.line_item_updated",
            InvoiceEvent::LineItemRemoved(_) => "invoicing.invoice.line_item_removed",
            InvoiceEvent::TaxRateChanged(_) => "invoicing.invoice.tax_rate_changed",
            InvoiceEvent::InvoiceSent(_) => "invoicing.invoice.sent",
            InvoiceEvent::InvoiceViewed(_) => "invoicing.invoice.viewed",
            InvoiceEvent::InvoiceMarkedOverdue(_) => "invoicing.invoice.marked_overdue",
            InvoiceEvent::PaymentApplied(_) => "invoicing.invoice.payment_applied",
            InvoiceEvent::InvoiceCancelled(_) => "invoicing.invoice.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceCreated(e) => e.occurred_at,
            InvoiceEvent::LineItemAdded(e) => e.occurred_at,
            InvoiceEvent::LineItemUpdated(e) => e.occurred_at,
            InvoiceEvent::LineItemRemoved(e) => e.occurred_at,
            InvoiceEvent::TaxRateChanged(e) => e.occurred_at,
            InvoiceEvent::InvoiceSent(e) => e.occurred_at,
            InvoiceEvent::InvoiceViewed(e) => e.occurred_at,
            InvoiceEvent::InvoiceMarkedOverdue(e) => e.occurred_at,
            InvoiceEvent::PaymentApplied(e) => e.occurred_at,
            InvoiceEvent::InvoiceCancelled(e) => e.occurred_at,
        }
    }
}

impl InvoiceEvent {
    /// Stream the event belongs to.
    pub fn invoice_id(&self) -> InvoiceId {
        match self {
            InvoiceEvent::InvoiceCreated(e) => e.invoice_id,
            InvoiceEvent::LineItemAdded(e) => e.invoice_id,
            InvoiceEvent::LineItemUpdated(e) => e.invoice_id,
            InvoiceEvent::LineItemRemoved(e) => e.invoice_id,
            InvoiceEvent::TaxRateChanged(e) => e.invoice_id,
            InvoiceEvent::InvoiceSent(e) => e.invoice_id,
            InvoiceEvent::InvoiceViewed(e) => e.invoice_id,
            InvoiceEvent::InvoiceMarkedOverdue(e) => e.invoice_id,
            InvoiceEvent::PaymentApplied(e) => e.invoice_id,
            InvoiceEvent::InvoiceCancelled(e) => e.invoice_id,
        }
    }

    pub fn organization_id(&self) -> OrganizationId {
        match self {
            InvoiceEvent::InvoiceCreated(e) => e.organization_id,
            InvoiceEvent::LineItemAdded(e) => e.organization_id,
            InvoiceEvent::LineItemUpdated(e) => e.organization_id,
            InvoiceEvent::LineItemRemoved(e) => e.organization_id,
            InvoiceEvent::TaxRateChanged(e) => e.organization_id,
            InvoiceEvent::InvoiceSent(e) => e.organization_id,
            InvoiceEvent::InvoiceViewed(e) => e.organization_id,
            InvoiceEvent::InvoiceMarkedOverdue(e) => e.organization_id,
            InvoiceEvent::PaymentApplied(e) => e.organization_id,
            InvoiceEvent::InvoiceCancelled(e) => e.organization_id,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceCreated(e) => {
                self.id = e.invoice_id;
                self.header = Some(InvoiceHeader {
                    organization_id: e.organization_id,
                    invoice_number: e.invoice_number.clone(),
                    project_id: e.project_id,
                    phase_id: e.phase_id,
                    client_id: e.client_id,
                    issue_date: e.issue_date,
                    due_date: e.due_date,
                    created_by: e.created_by,
                });
                self.status = InvoiceStatus::Draft;
                self.items.clear();
                self.next_line_no = 1;
                self.tax_rate = e.tax_rate;
                self.totals.paid_amount = Decimal::ZERO;
                self.last_payment_date = None;
            }
            InvoiceEvent::LineItemAdded(e) => {
                self.items.push(LineItem::from_draft(e.line_no, &e.item));
                self.next_line_no = self.next_line_no.max(e.line_no + 1);
            }
            InvoiceEvent::LineItemUpdated(e) => {
                if let Some(slot) = self.items.iter_mut().find(|i| i.line_no() == e.line_no) {
                    *slot = LineItem::from_draft(e.line_no, &e.item);
                }
            }
            InvoiceEvent::LineItemRemoved(e) => {
                self.items.retain(|i| i.line_no() != e.line_no);
            }
            InvoiceEvent::TaxRateChanged(e) => {
                self.tax_rate = e.tax_rate;
            }
            InvoiceEvent::InvoiceSent(_) => {
                self.status = InvoiceStatus::Sent;
            }
            InvoiceEvent::InvoiceViewed(_) => {
                self.status = InvoiceStatus::Viewed;
            }
            InvoiceEvent::InvoiceMarkedOverdue(_) => {
                self.status = InvoiceStatus::Overdue;
            }
            InvoiceEvent::PaymentApplied(e) => {
                self.totals.paid_amount = e.amount;
                self.last_payment_date = Some(e.payment_date);
                self.status = InvoiceStatus::Paid;
            }
            InvoiceEvent::InvoiceCancelled(_) => {
                self.status = InvoiceStatus::Cancelled;
            }
        }

        self.totals = recompute_totals(&self.items, self.tax_rate, self.totals.paid_amount);

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::CreateInvoice(cmd) => self.handle_create(cmd),
            InvoiceCommand::AddLineItem(cmd) => self.handle_add_item(cmd),
            InvoiceCommand::UpdateLineItem(cmd) => self.handle_update_item(cmd),
            InvoiceCommand::RemoveLineItem(cmd) => self.handle_remove_item(cmd),
            InvoiceCommand::SetTaxRate(cmd) => self.handle_set_tax_rate(cmd),
            InvoiceCommand::MarkSent(cmd) => self.handle_mark_sent(cmd),
            InvoiceCommand::MarkViewed(cmd) => self.handle_mark_viewed(cmd),
            InvoiceCommand::CancelInvoice(cmd) => self.handle_cancel(cmd),
            InvoiceCommand::SweepOverdue(cmd) => self.handle_sweep_overdue(cmd),
            InvoiceCommand::ApplyPayment(cmd) => self.handle_apply_payment(cmd),
        }
    }
}

impl Invoice {
    /// Existing invoice of `organization_id` addressed as `invoice_id`.
    ///
    /// Another organization's invoice is reported as missing, not forbidden.
    fn ensure_existing(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
    ) -> Result<&InvoiceHeader, DomainError> {
        let header = match &self.header {
            Some(h) if h.organization_id == organization_id => h,
            _ => return Err(DomainError::not_found(format!("invoice {invoice_id}"))),
        };
        if self.id != invoice_id {
            return Err(DomainError::conflict("invoice_id does not match invoice stream"));
        }
        Ok(header)
    }

    fn ensure_draft(&self, header: &InvoiceHeader) -> Result<(), DomainError> {
        if self.status != InvoiceStatus::Draft {
            return Err(DomainError::invalid_state(format!(
                "invoice {} is {}; only draft invoices can be edited",
                header.invoice_number, self.status
            )));
        }
        Ok(())
    }

    fn ensure_line(&self, line_no: u32) -> Result<&LineItem, DomainError> {
        self.item(line_no)
            .ok_or_else(|| DomainError::not_found(format!("line item {line_no} on invoice {}", self.id)))
    }

    fn handle_create(&self, cmd: &CreateInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.is_created() {
            return Err(DomainError::conflict("invoice already exists"));
        }
        if self.id != cmd.invoice_id {
            return Err(DomainError::conflict("invoice_id does not match invoice stream"));
        }
        if cmd.due_date < cmd.issue_date {
            return Err(DomainError::validation(format!(
                "due_date {} is before issue_date {}",
                cmd.due_date, cmd.issue_date
            )));
        }
        validate_tax_rate(cmd.tax_rate)?;
        for item in &cmd.items {
            item.validate()?;
        }
        ensure_representable(
            cmd.items.iter().map(|d| d.quantity * d.unit_price),
            cmd.tax_rate,
        )?;

        let mut events = Vec::with_capacity(cmd.items.len() + 1);
        events.push(InvoiceEvent::InvoiceCreated(InvoiceCreated {
            organization_id: cmd.organization_id,
            invoice_id: cmd.invoice_id,
            invoice_number: cmd.invoice_number.clone(),
            project_id: cmd.project_id,
            phase_id: cmd.phase_id,
            client_id: cmd.client_id,
            issue_date: cmd.issue_date,
            due_date: cmd.due_date,
            tax_rate: cmd.tax_rate,
            created_by: cmd.created_by,
            occurred_at: cmd.occurred_at,
        }));
        for (idx, item) in cmd.items.iter().enumerate() {
            events.push(InvoiceEvent::LineItemAdded(LineItemAdded {
                organization_id: cmd.organization_id,
                invoice_id: cmd.invoice_id,
                line_no: idx as u32 + 1,
                item: item.clone(),
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_add_item(&self, cmd: &AddLineItem) -> Result<Vec<InvoiceEvent>, DomainError> {
        let header = self.ensure_existing(cmd.organization_id, cmd.invoice_id)?;
        self.ensure_draft(header)?;
        cmd.item.validate()?;
        ensure_representable(
            self.items
                .iter()
                .map(LineItem::amount)
                .chain(std::iter::once(cmd.item.quantity * cmd.item.unit_price)),
            self.tax_rate,
        )?;

        Ok(vec![InvoiceEvent::LineItemAdded(LineItemAdded {
            organization_id: cmd.organization_id,
            invoice_id: cmd.invoice_id,
            line_no: self.next_line_no,
            item: cmd.item.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_item(&self, cmd: &UpdateLineItem) -> Result<Vec<InvoiceEvent>, DomainError> {
        let header = self.ensure_existing(cmd.organization_id, cmd.invoice_id)?;
        self.ensure_draft(header)?;
        self.ensure_line(cmd.line_no)?;
        cmd.item.validate()?;
        ensure_representable(
            self.items.iter().map(|i| {
                if i.line_no() == cmd.line_no {
                    cmd.item.quantity * cmd.item.unit_price
                } else {
                    i.amount()
                }
            }),
            self.tax_rate,
        )?;

        Ok(vec![InvoiceEvent::LineItemUpdated(LineItemUpdated {
            organization_id: cmd.organization_id,
            invoice_id: cmd.invoice_id,
            line_no: cmd.line_no,
            item: cmd.item.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_item(&self, cmd: &RemoveLineItem) -> Result<Vec<InvoiceEvent>, DomainError> {
        let header = self.ensure_existing(cmd.organization_id, cmd.invoice_id)?;
        self.ensure_draft(header)?;
        self.ensure_line(cmd.line_no)?;

        Ok(vec![InvoiceEvent::LineItemRemoved(LineItemRemoved {
            organization_id: cmd.organization_id,
            invoice_id: cmd.invoice_id,
            line_no: cmd.line_no,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_tax_rate(&self, cmd: &SetTaxRate) -> Result<Vec<InvoiceEvent>, DomainError> {
        let header = self.ensure_existing(cmd.organization_id, cmd.invoice_id)?;
        self.ensure_draft(header)?;
        validate_tax_rate(cmd.tax_rate)?;
        ensure_representable(self.items.iter().map(LineItem::amount), cmd.tax_rate)?;

        if cmd.tax_rate == self.tax_rate {
            return Ok(vec![]);
        }

        Ok(vec![InvoiceEvent::TaxRateChanged(TaxRateChanged {
            organization_id: cmd.organization_id,
            invoice_id: cmd.invoice_id,
            tax_rate: cmd.tax_rate,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_sent(&self, cmd: &MarkSent) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_existing(cmd.organization_id, cmd.invoice_id)?;
        transition(self.status, InvoiceStatus::Sent)?;

        Ok(vec![InvoiceEvent::InvoiceSent(InvoiceSent {
            organization_id: cmd.organization_id,
            invoice_id: cmd.invoice_id,
            sent_by: cmd.actor_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_viewed(&self, cmd: &MarkViewed) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_existing(cmd.organization_id, cmd.invoice_id)?;
        transition(self.status, InvoiceStatus::Viewed)?;

        Ok(vec![InvoiceEvent::InvoiceViewed(InvoiceViewed {
            organization_id: cmd.organization_id,
            invoice_id: cmd.invoice_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_existing(cmd.organization_id, cmd.invoice_id)?;
        transition(self.status, InvoiceStatus::Cancelled)?;

        Ok(vec![InvoiceEvent::InvoiceCancelled(InvoiceCancelled {
            organization_id: cmd.organization_id,
            invoice_id: cmd.invoice_id,
            cancelled_by: cmd.actor_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_sweep_overdue(&self, cmd: &SweepOverdue) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_existing(cmd.organization_id, cmd.invoice_id)?;

        if !self.is_past_due(cmd.today) {
            return Ok(vec![]);
        }

        Ok(vec![InvoiceEvent::InvoiceMarkedOverdue(InvoiceMarkedOverdue {
            organization_id: cmd.organization_id,
            invoice_id: cmd.invoice_id,
            as_of: cmd.today,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_apply_payment(&self, cmd: &ApplyPayment) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_existing(cmd.organization_id, self.id)?;
        check_payment(self, &cmd.payment, cmd.today)?;

        Ok(vec![InvoiceEvent::PaymentApplied(PaymentApplied {
            organization_id: cmd.organization_id,
            invoice_id: self.id,
            amount: cmd.payment.amount,
            payment_date: cmd.payment.payment_date,
            recorded_by: cmd.recorded_by,
            occurred_at: cmd.occurred_at,
        })])
    }
}
