//! Command hook chains.
//!
//! Three chains wrap command execution: PRE (may suppress or abort the
//! command), POST (observers, run after), and ERROR (run when the command
//! failed). Chains are kept in descending priority order at insertion time;
//! registration hands back a monotonic id for later removal. All counters
//! are atomics so hook overhead can be read from anywhere.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;
use tracing::warn;

use core_keymap::CommandId;
use core_model::WindowId;
use core_state::BufferId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    Pre,
    Post,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookResult {
    /// Proceed with the command.
    Continue,
    /// The hook handled the command; skip it and report success.
    Handled,
    /// Skip the command and report failure.
    Abort,
    /// Hook itself failed; logged, execution continues.
    Error,
}

/// Everything a hook can observe about the wrapped command.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub command: CommandId,
    pub name: &'static str,
    pub prefix: bool,
    pub count: i64,
    pub buffer: Option<BufferId>,
    pub window: WindowId,
    pub started: Instant,
    pub ended: Option<Instant>,
    pub buffer_changed: bool,
    pub window_changed: bool,
    pub failed: bool,
}

pub type HookFn = fn(&HookContext) -> HookResult;

struct Hook {
    id: u32,
    f: HookFn,
    priority: i32,
    active: bool,
    name: String,
    target: Option<CommandId>,
}

#[derive(Debug, Default)]
pub struct HookCounters {
    pub executions: AtomicU64,
    pub aborts: AtomicU64,
    pub errors: AtomicU64,
    pub total_ns: AtomicU64,
}

pub struct HookSystem {
    pre: Vec<Hook>,
    post: Vec<Hook>,
    error: Vec<Hook>,
    next_id: AtomicU32,
    pub enabled: bool,
    pub counters: HookCounters,
}

impl Default for HookSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl HookSystem {
    pub fn new() -> Self {
        Self {
            pre: Vec::new(),
            post: Vec::new(),
            error: Vec::new(),
            next_id: AtomicU32::new(1),
            enabled: true,
            counters: HookCounters::default(),
        }
    }

    fn chain_mut(&mut self, phase: HookPhase) -> &mut Vec<Hook> {
        match phase {
            HookPhase::Pre => &mut self.pre,
            HookPhase::Post => &mut self.post,
            HookPhase::Error => &mut self.error,
        }
    }

    /// Register a hook; higher priority runs first. Returns the hook id.
    pub fn register(
        &mut self,
        phase: HookPhase,
        f: HookFn,
        priority: i32,
        target: Option<CommandId>,
        name: &str,
    ) -> u32 {
        let id = self.next_id.fetch_add(1, Ordering::AcqRel);
        let hook = Hook {
            id,
            f,
            priority,
            active: true,
            name: name.to_string(),
            target,
        };
        let chain = self.chain_mut(phase);
        let at = chain
            .iter()
            .position(|h| h.priority < priority)
            .unwrap_or(chain.len());
        chain.insert(at, hook);
        id
    }

    pub fn unregister(&mut self, id: u32) -> bool {
        for chain in [&mut self.pre, &mut self.post, &mut self.error] {
            let before = chain.len();
            chain.retain(|h| h.id != id);
            if chain.len() != before {
                return true;
            }
        }
        false
    }

    pub fn set_active(&mut self, id: u32, active: bool) -> bool {
        for chain in [&mut self.pre, &mut self.post, &mut self.error] {
            if let Some(h) = chain.iter_mut().find(|h| h.id == id) {
                h.active = active;
                return true;
            }
        }
        false
    }

    fn applies(hook: &Hook, command: CommandId) -> bool {
        hook.active && hook.target.is_none_or(|t| t == command)
    }

    /// Run the PRE chain. The first HANDLED or ABORT outcome wins; ERROR is
    /// logged and the chain continues.
    pub fn run_pre(&self, ctx: &HookContext) -> HookResult {
        if !self.enabled {
            return HookResult::Continue;
        }
        for hook in &self.pre {
            if !Self::applies(hook, ctx.command) {
                continue;
            }
            self.counters.executions.fetch_add(1, Ordering::Relaxed);
            match (hook.f)(ctx) {
                HookResult::Continue => {}
                HookResult::Handled => return HookResult::Handled,
                HookResult::Abort => {
                    self.counters.aborts.fetch_add(1, Ordering::Relaxed);
                    return HookResult::Abort;
                }
                HookResult::Error => {
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(target: "actions.hooks", hook = %hook.name, "pre_hook_error");
                }
            }
        }
        HookResult::Continue
    }

    /// Run the POST chain: observers only, no skip semantics.
    pub fn run_post(&self, ctx: &HookContext) {
        if !self.enabled {
            return;
        }
        for hook in &self.post {
            if !Self::applies(hook, ctx.command) {
                continue;
            }
            self.counters.executions.fetch_add(1, Ordering::Relaxed);
            if (hook.f)(ctx) == HookResult::Error {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!(target: "actions.hooks", hook = %hook.name, "post_hook_error");
            }
        }
        if let Some(ended) = ctx.ended {
            let ns = ended.duration_since(ctx.started).as_nanos() as u64;
            self.counters.total_ns.fetch_add(ns, Ordering::Relaxed);
        }
    }

    /// Run the ERROR chain after a failed command.
    pub fn run_error(&self, ctx: &HookContext) {
        if !self.enabled {
            return;
        }
        for hook in &self.error {
            if !Self::applies(hook, ctx.command) {
                continue;
            }
            self.counters.executions.fetch_add(1, Ordering::Relaxed);
            let _ = (hook.f)(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    static CALLS: AtomicUsize = AtomicUsize::new(0);

    fn ctx() -> HookContext {
        HookContext {
            command: CommandId(0),
            name: "test-command",
            prefix: false,
            count: 1,
            buffer: None,
            window: WindowId(0),
            started: Instant::now(),
            ended: None,
            buffer_changed: false,
            window_changed: false,
            failed: false,
        }
    }

    fn continue_hook(_: &HookContext) -> HookResult {
        CALLS.fetch_add(1, Ordering::SeqCst);
        HookResult::Continue
    }

    fn abort_hook(_: &HookContext) -> HookResult {
        HookResult::Abort
    }

    #[test]
    fn priority_orders_chain() {
        let mut hooks = HookSystem::new();
        hooks.register(HookPhase::Pre, continue_hook, 0, None, "low");
        let high = hooks.register(HookPhase::Pre, abort_hook, 10, None, "high");
        // The high-priority abort runs first and wins.
        assert_eq!(hooks.run_pre(&ctx()), HookResult::Abort);
        assert_eq!(hooks.counters.aborts.load(Ordering::Relaxed), 1);
        hooks.unregister(high);
        assert_eq!(hooks.run_pre(&ctx()), HookResult::Continue);
    }

    #[test]
    fn target_command_filters() {
        let mut hooks = HookSystem::new();
        hooks.register(
            HookPhase::Pre,
            abort_hook,
            0,
            Some(CommandId(42)),
            "targeted",
        );
        // Context command is 0, hook targets 42: not run.
        assert_eq!(hooks.run_pre(&ctx()), HookResult::Continue);
        let mut target_ctx = ctx();
        target_ctx.command = CommandId(42);
        assert_eq!(hooks.run_pre(&target_ctx), HookResult::Abort);
    }

    #[test]
    fn inactive_hooks_are_skipped() {
        let mut hooks = HookSystem::new();
        let id = hooks.register(HookPhase::Pre, abort_hook, 0, None, "toggled");
        assert_eq!(hooks.run_pre(&ctx()), HookResult::Abort);
        hooks.set_active(id, false);
        assert_eq!(hooks.run_pre(&ctx()), HookResult::Continue);
    }

    #[test]
    fn registration_ids_are_monotonic() {
        let mut hooks = HookSystem::new();
        let a = hooks.register(HookPhase::Post, continue_hook, 0, None, "a");
        let b = hooks.register(HookPhase::Error, continue_hook, 0, None, "b");
        assert!(b > a);
        assert!(hooks.unregister(a));
        assert!(!hooks.unregister(a));
    }
}
