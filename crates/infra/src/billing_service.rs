//! Billing application service.
//!
//! Drives the phase checklist and invoice aggregates through the command
//! dispatcher, keeps the invoice directory current, and composes the
//! collaborators (numbering, mailer, renderer, clock) around the domain.
//! Callers supply an already-authorized organization and actor.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use stagebill_core::{
    AggregateId, AggregateRoot, Clock, DomainError, OrganizationId, SystemClock, UserId,
};
use stagebill_events::{EventEnvelope, InMemoryEventBus};
use stagebill_invoicing::{
    AddLineItem, ApplyPayment, CancelInvoice, ClientId, CreateInvoice, Invoice, InvoiceCommand,
    InvoiceId, InvoiceSnapshot, InvoiceStatus, LineItemDraft, MarkSent, MarkViewed, Payment,
    RemoveLineItem, SetTaxRate, SweepOverdue, UpdateLineItem, transition,
};
use stagebill_projects::{
    AdoptChecklist, ChecklistCommand, Deliverable, DeliverableId, EnsureDefaultDeliverables,
    PhaseChecklist, PhaseCompletionSummary, PhaseId, ProjectId, ToggleDeliverable, can_invoice,
    ensure_invoiceable,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::config::BillingConfig;
use crate::event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent};
use crate::mailer::{InvoiceMailer, LogMailer, MailerError};
use crate::numbering::{InMemoryInvoiceNumberAllocator, InvoiceNumberAllocator, NumberingError};
use crate::projections::{INVOICE_AGGREGATE_TYPE, InvoiceDirectoryProjection, InvoiceProjectionError};
use crate::read_model::InMemoryTenantStore;
use crate::renderer::{InvoiceRenderer, RenderError, RenderedDocument, TextInvoiceRenderer};

/// Stream type phase checklists are stored under.
pub const CHECKLIST_AGGREGATE_TYPE: &str = "projects.phase_checklist";

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type Directory = InvoiceDirectoryProjection<Arc<InMemoryTenantStore<InvoiceId, Invoice>>>;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Numbering(#[from] NumberingError),

    #[error(transparent)]
    Mail(#[from] MailerError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Projection(#[from] InvoiceProjectionError),

    #[error(transparent)]
    Store(#[from] EventStoreError),
}

impl From<DomainError> for BillingError {
    fn from(value: DomainError) -> Self {
        BillingError::Dispatch(DispatchError::Domain(value))
    }
}

impl BillingError {
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            BillingError::Dispatch(e) => e.as_domain(),
            _ => None,
        }
    }
}

/// Input for invoice creation. Omitted dates and tax rate fall back to
/// [`BillingConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvoice {
    pub project_id: ProjectId,
    pub phase_id: Option<PhaseId>,
    pub client_id: ClientId,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub tax_rate: Option<Decimal>,
    pub items: Vec<LineItemDraft>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EmailOutcome {
    /// No recipient was given.
    Skipped,
    Delivered { recipient: String },
    Failed { recipient: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendOutcome {
    pub invoice: InvoiceSnapshot,
    pub email: EmailOutcome,
}

/// Invoices with a send in progress on this service.
#[derive(Debug, Default)]
struct SendsInFlight(Mutex<HashSet<(OrganizationId, InvoiceId)>>);

impl SendsInFlight {
    fn claim(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
    ) -> Result<SendClaim<'_>, DomainError> {
        let key = (organization_id, invoice_id);
        let mut held = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(key) {
            return Err(DomainError::conflict(format!(
                "invoice {invoice_id} is already being sent"
            )));
        }
        Ok(SendClaim { sends: self, key })
    }
}

/// Released on drop, whether the send succeeded or not.
struct SendClaim<'a> {
    sends: &'a SendsInFlight,
    key: (OrganizationId, InvoiceId),
}

impl Drop for SendClaim<'_> {
    fn drop(&mut self) {
        let mut held = self.sends.0.lock().unwrap_or_else(PoisonError::into_inner);
        held.remove(&self.key);
    }
}

pub struct BillingService {
    dispatcher: CommandDispatcher<Arc<dyn EventStore>, Bus>,
    directory: Directory,
    numbers: Arc<dyn InvoiceNumberAllocator>,
    mailer: Arc<dyn InvoiceMailer>,
    renderer: Arc<dyn InvoiceRenderer>,
    clock: Arc<dyn Clock>,
    sends: SendsInFlight,
    config: BillingConfig,
}

impl std::fmt::Debug for BillingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BillingService {
    /// In-memory service with the log mailer, the text renderer and the wall clock.
    pub fn new(config: BillingConfig) -> Self {
        let numbers = Arc::new(InMemoryInvoiceNumberAllocator::new(config.invoice_number_prefix.clone()));
        Self {
            dispatcher: CommandDispatcher::new(
                Arc::new(InMemoryEventStore::new()),
                Arc::new(InMemoryEventBus::new()),
            ),
            directory: InvoiceDirectoryProjection::new(Arc::new(InMemoryTenantStore::new())),
            numbers,
            mailer: Arc::new(LogMailer),
            renderer: Arc::new(TextInvoiceRenderer),
            clock: Arc::new(SystemClock),
            sends: SendsInFlight::default(),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn InvoiceMailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn InvoiceRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Swap the number allocator. It learns every number the directory
    /// already holds.
    pub fn with_number_allocator(
        mut self,
        numbers: Arc<dyn InvoiceNumberAllocator>,
    ) -> Result<Self, BillingError> {
        self.numbers = numbers;
        self.seed_numbers()?;
        Ok(self)
    }

    /// Swap the event store. The directory is rebuilt from it and the number
    /// allocator resumes after the highest number found.
    pub fn with_store(mut self, store: Arc<dyn EventStore>) -> Result<Self, BillingError> {
        self.dispatcher = CommandDispatcher::new(store, Arc::new(InMemoryEventBus::new()));
        self.directory = InvoiceDirectoryProjection::new(Arc::new(InMemoryTenantStore::new()));
        self.rebuild_directory()?;
        Ok(self)
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    pub fn event_store(&self) -> &Arc<dyn EventStore> {
        self.dispatcher.store()
    }

    pub fn bus(&self) -> &Bus {
        self.dispatcher.bus()
    }

    // ----- phase checklists -----

    fn dispatch_checklist(
        &self,
        organization_id: OrganizationId,
        phase_id: PhaseId,
        command: ChecklistCommand,
    ) -> Result<PhaseChecklist, BillingError> {
        self.dispatcher
            .dispatch(organization_id, phase_id.0, CHECKLIST_AGGREGATE_TYPE, command, |id| {
                PhaseChecklist::empty(PhaseId::new(id))
            })?;
        self.load_checklist(organization_id, phase_id)
    }

    fn load_checklist(
        &self,
        organization_id: OrganizationId,
        phase_id: PhaseId,
    ) -> Result<PhaseChecklist, BillingError> {
        Ok(self
            .dispatcher
            .load(organization_id, phase_id.0, CHECKLIST_AGGREGATE_TYPE, |id| {
                PhaseChecklist::empty(PhaseId::new(id))
            })?)
    }

    /// Give the phase the configured default checklist unless it already has
    /// deliverables. Returns the phase's deliverables either way.
    pub fn ensure_defaults(
        &self,
        organization_id: OrganizationId,
        phase_id: PhaseId,
    ) -> Result<Vec<Deliverable>, BillingError> {
        let checklist = self.dispatch_checklist(
            organization_id,
            phase_id,
            ChecklistCommand::EnsureDefaultDeliverables(EnsureDefaultDeliverables {
                organization_id,
                phase_id,
                names: self.config.default_deliverables.clone(),
                occurred_at: self.clock.now(),
            }),
        )?;
        Ok(checklist.deliverables().to_vec())
    }

    pub fn adopt_checklist(
        &self,
        organization_id: OrganizationId,
        phase_id: PhaseId,
        names: Vec<String>,
    ) -> Result<Vec<Deliverable>, BillingError> {
        let checklist = self.dispatch_checklist(
            organization_id,
            phase_id,
            ChecklistCommand::AdoptChecklist(AdoptChecklist {
                organization_id,
                phase_id,
                names,
                occurred_at: self.clock.now(),
            }),
        )?;
        tracing::info!(
            organization_id = %organization_id,
            phase_id = %phase_id,
            deliverables = checklist.deliverables().len(),
            "checklist adopted"
        );
        Ok(checklist.deliverables().to_vec())
    }

    pub fn toggle_deliverable(
        &self,
        organization_id: OrganizationId,
        phase_id: PhaseId,
        deliverable_id: DeliverableId,
        actor_id: UserId,
    ) -> Result<Deliverable, BillingError> {
        let checklist = self.dispatch_checklist(
            organization_id,
            phase_id,
            ChecklistCommand::ToggleDeliverable(ToggleDeliverable {
                organization_id,
                phase_id,
                deliverable_id,
                actor_id,
                occurred_at: self.clock.now(),
            }),
        )?;
        let deliverable = checklist
            .deliverable(deliverable_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("deliverable {deliverable_id}")))?;

        tracing::info!(
            organization_id = %organization_id,
            phase_id = %phase_id,
            deliverable_id = %deliverable_id,
            is_completed = deliverable.is_completed,
            "deliverable toggled"
        );
        Ok(deliverable)
    }

    pub fn deliverables(
        &self,
        organization_id: OrganizationId,
        phase_id: PhaseId,
    ) -> Result<Vec<Deliverable>, BillingError> {
        Ok(self.load_checklist(organization_id, phase_id)?.deliverables().to_vec())
    }

    /// Completion of a phase, computed from one rehydrated checklist.
    pub fn phase_summary(
        &self,
        organization_id: OrganizationId,
        phase_id: PhaseId,
    ) -> Result<PhaseCompletionSummary, BillingError> {
        Ok(self.load_checklist(organization_id, phase_id)?.summary())
    }

    pub fn can_invoice_phase(
        &self,
        organization_id: OrganizationId,
        phase_id: PhaseId,
    ) -> Result<bool, BillingError> {
        Ok(can_invoice(&self.phase_summary(organization_id, phase_id)?))
    }

    // ----- invoices -----

    /// Commit `command`, against stream version `pinned` when given.
    fn invoice_stream(
        &self,
        organization_id: OrganizationId,
        command: InvoiceCommand,
        pinned: Option<u64>,
    ) -> Result<(Vec<StoredEvent>, Invoice), BillingError> {
        let invoice_id = command.invoice_id();
        let make = |id| Invoice::empty(InvoiceId::new(id));
        let committed = match pinned {
            None => self.dispatcher.dispatch(
                organization_id,
                invoice_id.0,
                INVOICE_AGGREGATE_TYPE,
                command,
                make,
            )?,
            Some(version) => self.dispatcher.dispatch_at(
                organization_id,
                invoice_id.0,
                INVOICE_AGGREGATE_TYPE,
                version,
                command,
                make,
            )?,
        };

        for stored in &committed {
            if let Err(err) = self.directory.apply_envelope(&stored.to_envelope()) {
                tracing::warn!(
                    organization_id = %organization_id,
                    invoice_id = %invoice_id,
                    sequence_number = stored.sequence_number,
                    error = %err,
                    "invoice directory update failed"
                );
            }
        }

        let invoice = self.load_invoice(organization_id, invoice_id)?;
        Ok((committed, invoice))
    }

    fn execute(
        &self,
        organization_id: OrganizationId,
        command: InvoiceCommand,
    ) -> Result<InvoiceSnapshot, BillingError> {
        let (_, invoice) = self.invoice_stream(organization_id, command, None)?;
        Ok(invoice.snapshot()?)
    }

    fn load_invoice(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
    ) -> Result<Invoice, BillingError> {
        Ok(self
            .dispatcher
            .load(organization_id, invoice_id.0, INVOICE_AGGREGATE_TYPE, |id| {
                Invoice::empty(InvoiceId::new(id))
            })?)
    }

    /// Create a draft invoice.
    ///
    /// When the invoice bills a phase, the phase must pass the readiness gate.
    pub fn create_invoice(
        &self,
        organization_id: OrganizationId,
        actor_id: UserId,
        new: NewInvoice,
    ) -> Result<InvoiceSnapshot, BillingError> {
        if let Some(phase_id) = new.phase_id {
            ensure_invoiceable(&self.phase_summary(organization_id, phase_id)?)?;
        }

        let issue_date = new.issue_date.unwrap_or_else(|| self.clock.today());
        let due_date = match new.due_date {
            Some(due) => due,
            None => issue_date
                .checked_add_days(Days::new(u64::from(self.config.default_payment_terms_days)))
                .ok_or_else(|| DomainError::validation("due date out of range"))?,
        };
        let tax_rate = new.tax_rate.unwrap_or(self.config.default_tax_rate);

        let invoice_id = InvoiceId::new(AggregateId::new());
        let invoice_number = self.numbers.allocate(organization_id)?;

        let snapshot = self.execute(
            organization_id,
            InvoiceCommand::CreateInvoice(CreateInvoice {
                organization_id,
                invoice_id,
                invoice_number,
                project_id: new.project_id,
                phase_id: new.phase_id,
                client_id: new.client_id,
                issue_date,
                due_date,
                tax_rate,
                items: new.items,
                created_by: actor_id,
                occurred_at: self.clock.now(),
            }),
        )?;

        tracing::info!(
            organization_id = %organization_id,
            invoice_id = %invoice_id,
            invoice_number = snapshot.invoice_number.as_str(),
            total = %snapshot.total_amount,
            "invoice created"
        );
        Ok(snapshot)
    }

    pub fn add_line_item(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
        item: LineItemDraft,
    ) -> Result<InvoiceSnapshot, BillingError> {
        self.execute(
            organization_id,
            InvoiceCommand::AddLineItem(AddLineItem {
                organization_id,
                invoice_id,
                item,
                occurred_at: self.clock.now(),
            }),
        )
    }

    pub fn update_line_item(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
        line_no: u32,
        item: LineItemDraft,
    ) -> Result<InvoiceSnapshot, BillingError> {
        self.execute(
            organization_id,
            InvoiceCommand::UpdateLineItem(UpdateLineItem {
                organization_id,
                invoice_id,
                line_no,
                item,
                occurred_at: self.clock.now(),
            }),
        )
    }

    pub fn remove_line_item(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
        line_no: u32,
    ) -> Result<InvoiceSnapshot, BillingError> {
        self.execute(
            organization_id,
            InvoiceCommand::RemoveLineItem(RemoveLineItem {
                organization_id,
                invoice_id,
                line_no,
                occurred_at: self.clock.now(),
            }),
        )
    }

    pub fn set_tax_rate(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
        tax_rate: Decimal,
    ) -> Result<InvoiceSnapshot, BillingError> {
        self.execute(
            organization_id,
            InvoiceCommand::SetTaxRate(SetTaxRate {
                organization_id,
                invoice_id,
                tax_rate,
                occurred_at: self.clock.now(),
            }),
        )
    }

    /// Draft → Sent. Sends no email.
    pub fn mark_sent(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
        actor_id: UserId,
    ) -> Result<InvoiceSnapshot, BillingError> {
        self.commit_sent(organization_id, invoice_id, actor_id, None)
    }

    fn commit_sent(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
        actor_id: UserId,
        pinned: Option<u64>,
    ) -> Result<InvoiceSnapshot, BillingError> {
        let (_, invoice) = self.invoice_stream(
            organization_id,
            InvoiceCommand::MarkSent(MarkSent {
                organization_id,
                invoice_id,
                actor_id,
                occurred_at: self.clock.now(),
            }),
            pinned,
        )?;
        tracing::info!(organization_id = %organization_id, invoice_id = %invoice_id, "invoice sent");
        Ok(invoice.snapshot()?)
    }

    /// Email the current state of an invoice. Changes nothing.
    pub fn email_invoice(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
        recipient: &str,
    ) -> Result<(), BillingError> {
        let snapshot = self.load_invoice(organization_id, invoice_id)?.snapshot()?;
        self.mailer.send_invoice_email(&snapshot, recipient)?;
        Ok(())
    }

    /// Email (when a recipient is given) then mark sent.
    ///
    /// A failed email is logged and reported in the outcome; the invoice is
    /// marked sent regardless. An invoice that cannot move to Sent is rejected
    /// before anything is emailed. A second send of the same invoice while one
    /// is in progress fails with `DomainError::Conflict`, and the Sent
    /// transition only commits against the version that was emailed.
    pub fn send_invoice(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
        actor_id: UserId,
        recipient: Option<&str>,
    ) -> Result<SendOutcome, BillingError> {
        let _claim = self.sends.claim(organization_id, invoice_id)?;
        let loaded = self.load_invoice(organization_id, invoice_id)?;
        let version = loaded.version();
        let current = loaded.snapshot()?;
        transition(current.status, InvoiceStatus::Sent)?;

        let email = match recipient {
            None => EmailOutcome::Skipped,
            Some(recipient) => match self.mailer.send_invoice_email(&current, recipient) {
                Ok(()) => EmailOutcome::Delivered {
                    recipient: recipient.to_string(),
                },
                Err(err) => {
                    tracing::warn!(
                        organization_id = %organization_id,
                        invoice_id = %invoice_id,
                        recipient,
                        error = %err,
                        "invoice email failed; marking sent anyway"
                    );
                    EmailOutcome::Failed {
                        recipient: recipient.to_string(),
                        error: err.to_string(),
                    }
                }
            },
        };

        let invoice = self.commit_sent(organization_id, invoice_id, actor_id, Some(version))?;
        Ok(SendOutcome { invoice, email })
    }

    pub fn mark_viewed(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
    ) -> Result<InvoiceSnapshot, BillingError> {
        let snapshot = self.execute(
            organization_id,
            InvoiceCommand::MarkViewed(MarkViewed {
                organization_id,
                invoice_id,
                occurred_at: self.clock.now(),
            }),
        )?;
        tracing::info!(organization_id = %organization_id, invoice_id = %invoice_id, "invoice viewed");
        Ok(snapshot)
    }

    pub fn cancel_invoice(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
        actor_id: UserId,
        reason: Option<String>,
    ) -> Result<InvoiceSnapshot, BillingError> {
        let snapshot = self.execute(
            organization_id,
            InvoiceCommand::CancelInvoice(CancelInvoice {
                organization_id,
                invoice_id,
                actor_id,
                reason,
                occurred_at: self.clock.now(),
            }),
        )?;
        tracing::info!(organization_id = %organization_id, invoice_id = %invoice_id, "invoice cancelled");
        Ok(snapshot)
    }

    /// Settle an invoice with one payment equal to its total.
    pub fn apply_payment(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
        actor_id: UserId,
        amount: Decimal,
        payment_date: NaiveDate,
    ) -> Result<InvoiceSnapshot, BillingError> {
        let snapshot = self.execute(
            organization_id,
            InvoiceCommand::ApplyPayment(ApplyPayment {
                organization_id,
                payment: Payment {
                    invoice_id,
                    amount,
                    payment_date,
                },
                today: self.clock.today(),
                recorded_by: actor_id,
                occurred_at: self.clock.now(),
            }),
        )?;
        tracing::info!(
            organization_id = %organization_id,
            invoice_id = %invoice_id,
            amount = %amount,
            "invoice paid"
        );
        Ok(snapshot)
    }

    /// Move one invoice to Overdue if it is past due. Never fails on a
    /// not-yet-due or settled invoice.
    pub fn sweep_overdue(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
    ) -> Result<InvoiceSnapshot, BillingError> {
        let today = self.clock.today();
        let (committed, invoice) = self.invoice_stream(
            organization_id,
            InvoiceCommand::SweepOverdue(SweepOverdue {
                organization_id,
                invoice_id,
                today,
                occurred_at: self.clock.now(),
            }),
            None,
        )?;

        if committed.is_empty() {
            tracing::debug!(organization_id = %organization_id, invoice_id = %invoice_id, "overdue sweep: nothing to do");
        } else {
            tracing::info!(organization_id = %organization_id, invoice_id = %invoice_id, as_of = %today, "invoice overdue");
        }
        Ok(invoice.snapshot()?)
    }

    /// Sweep every past-due invoice of an organization. Returns the ids that
    /// moved to Overdue.
    pub fn sweep_all_overdue(&self, organization_id: OrganizationId) -> Vec<InvoiceId> {
        let today = self.clock.today();
        let mut moved = Vec::new();

        for invoice in self.directory.list(organization_id) {
            if !invoice.status.is_awaiting_payment() || today <= invoice.due_date {
                continue;
            }
            match self.sweep_overdue(organization_id, invoice.id) {
                Ok(snapshot) if snapshot.status == InvoiceStatus::Overdue => moved.push(invoice.id),
                Ok(_) => {}
                Err(err) => tracing::warn!(
                    organization_id = %organization_id,
                    invoice_id = %invoice.id,
                    error = %err,
                    "overdue sweep failed"
                ),
            }
        }

        moved
    }

    /// Sweep every organization the directory knows about.
    pub fn sweep_every_organization(&self) -> usize {
        self.directory
            .organizations()
            .into_iter()
            .map(|organization_id| self.sweep_all_overdue(organization_id).len())
            .sum()
    }

    /// Current state of one invoice, swept first.
    pub fn get_invoice(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
    ) -> Result<InvoiceSnapshot, BillingError> {
        match self.sweep_overdue(organization_id, invoice_id) {
            Err(BillingError::Dispatch(DispatchError::Concurrency(_))) => {
                Ok(self.load_invoice(organization_id, invoice_id)?.snapshot()?)
            }
            other => other,
        }
    }

    /// Every invoice of the organization, swept first, ordered by number.
    pub fn list_invoices(&self, organization_id: OrganizationId) -> Vec<InvoiceSnapshot> {
        self.sweep_all_overdue(organization_id);
        self.directory.list(organization_id)
    }

    pub fn render_invoice(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
    ) -> Result<RenderedDocument, BillingError> {
        let snapshot = self.get_invoice(organization_id, invoice_id)?;
        Ok(self.renderer.render(&snapshot)?)
    }

    pub fn organizations(&self) -> Vec<OrganizationId> {
        self.directory.organizations()
    }

    /// Replay every invoice stream into a fresh directory.
    pub fn rebuild_directory(&self) -> Result<(), BillingError> {
        let envelopes = self
            .dispatcher
            .store()
            .load_all(INVOICE_AGGREGATE_TYPE)?
            .iter()
            .map(StoredEvent::to_envelope)
            .collect::<Vec<_>>();
        let count = envelopes.len();
        self.directory.rebuild_from_scratch(envelopes)?;
        self.seed_numbers()?;
        tracing::info!(events = count, "invoice directory rebuilt");
        Ok(())
    }

    fn seed_numbers(&self) -> Result<(), BillingError> {
        for organization_id in self.directory.organizations() {
            for number in self.directory.invoice_numbers(organization_id) {
                self.numbers.observe(organization_id, &number)?;
            }
        }
        Ok(())
    }
}
