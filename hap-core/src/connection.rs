//! Per-connection state: encryption status, authenticated controller, subscriptions, and the
//! pending timed-write transaction (§3 "ConnectionContext").

use crate::session::SecureSession;
use crate::time::Instant;
use std::collections::HashSet;

pub struct TimedWriteTransaction {
    pub pid: u64,
    pub expires_at: Instant,
}

pub struct ConnectionContext<'a> {
    pub id: u64,
    session: Option<SecureSession<'a>>,
    controller_id: Option<String>,
    subscriptions: HashSet<(u64, u16)>,
    timed_write: Option<TimedWriteTransaction>,
    close_requested: bool,
}

impl<'a> ConnectionContext<'a> {
    pub fn new(id: u64) -> Self {
        ConnectionContext {
            id,
            session: None,
            controller_id: None,
            subscriptions: HashSet::new(),
            timed_write: None,
            close_requested: false,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&SecureSession<'a>> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut SecureSession<'a>> {
        self.session.as_mut()
    }

    pub fn upgrade_to_secure(&mut self, session: SecureSession<'a>, controller_id: String) {
        self.session = Some(session);
        self.controller_id = Some(controller_id);
    }

    pub fn controller_id(&self) -> Option<&str> {
        self.controller_id.as_deref()
    }

    /// Every paired controller is treated as admin in this implementation (§9/ConnectionContext,
    /// matching the source's current behavior rather than introducing a permission tier the spec
    /// doesn't otherwise use).
    pub fn is_admin(&self) -> bool {
        self.controller_id.is_some()
    }

    pub fn reset(&mut self) {
        self.session = None;
        self.controller_id = None;
        self.subscriptions.clear();
        self.timed_write = None;
    }

    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    pub fn subscribe(&mut self, aid: u64, iid: u16) {
        self.subscriptions.insert((aid, iid));
    }

    pub fn unsubscribe(&mut self, aid: u64, iid: u16) {
        self.subscriptions.remove(&(aid, iid));
    }

    pub fn is_subscribed(&self, aid: u64, iid: u16) -> bool {
        self.subscriptions.contains(&(aid, iid))
    }

    pub fn prepare_timed_write(&mut self, pid: u64, ttl: crate::time::Duration, now: Instant) {
        self.timed_write = Some(TimedWriteTransaction {
            pid,
            expires_at: now + ttl,
        });
    }

    /// Consumes the pending transaction if `pid` matches and it hasn't expired.
    pub fn validate_timed_write(&mut self, pid: u64, now: Instant) -> bool {
        match &self.timed_write {
            Some(tw) if tw.pid == pid && now <= tw.expires_at => {
                self.timed_write = None;
                true
            }
            _ => false,
        }
    }
}
