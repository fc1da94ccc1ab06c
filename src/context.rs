//! Per-action execution context.
//!
//! One `ActionContext` lives for exactly one `apply` invocation. The
//! notification and inline-action queues collect what the guest emits;
//! the dispatcher drains them after the guest returns. Iterator caches are
//! kept alongside in the wasmtime store data (`HostEnv`), never here, so a
//! queued child starts from a clean slate.

use crate::account::PermissionLevel;
use crate::name::Name;

/// A call to a contract: target account, action name, payload, and the
/// authorization the sender claims.
#[derive(Clone, Debug)]
pub struct Action {
    pub account: Name,
    pub name: Name,
    pub authorization: Vec<PermissionLevel>,
    pub data: Vec<u8>,
}

#[derive(Debug)]
pub struct ActionContext {
    /// The account whose code is running.
    pub receiver: Name,
    /// The original target of the action, before notification forwarding.
    pub first_receiver: Name,
    pub action: Name,
    pub data: Vec<u8>,
    pub authorization: Vec<PermissionLevel>,
    /// The inline sender; empty for top-level actions and their
    /// notifications.
    pub sender: Name,
    /// Recipients seen so far, the receiver itself first. Entries past the
    /// first are the pending notification queue, in enqueue order.
    pub notified: Vec<Name>,
    pub inline_actions: Vec<Action>,
    pub return_value: Vec<u8>,
}

impl ActionContext {
    pub fn from_action(action: &Action) -> Self {
        ActionContext {
            receiver: action.account,
            first_receiver: action.account,
            action: action.name,
            data: action.data.clone(),
            authorization: action.authorization.clone(),
            sender: Name::default(),
            notified: vec![action.account],
            inline_actions: Vec::new(),
            return_value: Vec::new(),
        }
    }

    /// The context a notified contract runs under: same action, same
    /// payload, same sender; only the receiver changes.
    pub fn notification_for(&self, recipient: Name) -> Self {
        ActionContext {
            receiver: recipient,
            first_receiver: self.first_receiver,
            action: self.action,
            data: self.data.clone(),
            authorization: self.authorization.clone(),
            sender: self.sender,
            notified: vec![recipient],
            inline_actions: Vec::new(),
            return_value: Vec::new(),
        }
    }

    /// The context an inline action runs under: a fresh dispatch whose
    /// sender is the emitting contract.
    pub fn inline_child(action: &Action, sender: Name) -> Self {
        let mut ctx = ActionContext::from_action(action);
        ctx.sender = sender;
        ctx
    }

    pub fn is_inline(&self) -> bool {
        !self.sender.is_empty()
    }

    pub fn is_notification(&self) -> bool {
        self.receiver != self.first_receiver
    }

    /// Queue a notification. At most one per recipient per action; the
    /// receiver never notifies itself.
    pub fn require_recipient(&mut self, recipient: Name) -> bool {
        if self.notified.contains(&recipient) {
            return false;
        }
        self.notified.push(recipient);
        true
    }
}
