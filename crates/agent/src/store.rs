//! Conversation store: bounded per-user history, continuation tokens and
//! interaction state.
//!
//! Every user gets one context behind its own lock, so
//! different users never contend. The outer map is only write-locked when a
//! user is seen for the first time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use m1nd_core::message::ConversationTurn;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use crate::session::{UserEvent, UserState};

/// Default number of turns kept per user.
pub const DEFAULT_MAX_HISTORY: usize = 10;

/// Everything the store knows about one user.
#[derive(Debug, Default)]
struct ConversationContext {
    /// System turn first if present
    turns: Vec<ConversationTurn>,

    /// Provider id → last resume handle issued by that provider
    continuation_tokens: HashMap<String, String>,

    state: UserState,

    /// Bumped on every clear; stale writers compare against it
    generation: u64,
}

struct UserSlot {
    context: Mutex<ConversationContext>,
    turn_gate: Arc<Mutex<()>>,
}

/// Held for the duration of one question; a second question from the same
/// user waits until it is dropped.
pub type TurnGuard = OwnedMutexGuard<()>;

pub struct ConversationStore {
    max_history: usize,
    system_prompt: Option<String>,
    users: RwLock<HashMap<String, Arc<UserSlot>>>,
    generations: AtomicU64,
}

impl ConversationStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history: max_history.max(2),
            system_prompt: None,
            users: RwLock::new(HashMap::new()),
            generations: AtomicU64::new(0),
        }
    }

    /// Seed every new context with this system turn.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.system_prompt = (!prompt.trim().is_empty()).then_some(prompt);
        self
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn existing(&self, user_id: &str) -> Option<Arc<UserSlot>> {
        self.users.read().await.get(user_id).cloned()
    }

    async fn slot(&self, user_id: &str) -> Arc<UserSlot> {
        if let Some(slot) = self.existing(user_id).await {
            return slot;
        }

        let mut users = self.users.write().await;
        users
            .entry(user_id.to_string())
            .or_insert_with(|| {
                debug!(user_id = %user_id, "Creating conversation context");
                Arc::new(UserSlot {
                    context: Mutex::new(ConversationContext {
                        generation: self.next_generation(),
                        ..ConversationContext::default()
                    }),
                    turn_gate: Arc::new(Mutex::new(())),
                })
            })
            .clone()
    }

    /// Append a turn, then trim the history to the configured bound.
    ///
    /// Returns the context generation the turn landed in, read under the
    /// same lock, for a later [`ConversationStore::commit`].
    pub async fn append(&self, user_id: &str, turn: ConversationTurn) -> u64 {
        let slot = self.slot(user_id).await;
        let mut ctx = slot.context.lock().await;
        self.push(&mut ctx, turn);
        ctx.generation
    }

    /// A system turn always sits at index 0: it replaces an existing one or
    /// is inserted in front.
    fn push(&self, ctx: &mut ConversationContext, turn: ConversationTurn) {
        if turn.is_system() {
            match ctx.turns.first_mut() {
                Some(first) if first.is_system() => *first = turn,
                _ => ctx.turns.insert(0, turn),
            }
        } else {
            if ctx.turns.is_empty() {
                if let Some(prompt) = &self.system_prompt {
                    ctx.turns.push(ConversationTurn::system(prompt));
                }
            }
            ctx.turns.push(turn);
        }
        trim(&mut ctx.turns, self.max_history);
    }

    /// Current history; empty for unknown users.
    pub async fn history(&self, user_id: &str) -> Vec<ConversationTurn> {
        match self.existing(user_id).await {
            Some(slot) => slot.context.lock().await.turns.clone(),
            None => Vec::new(),
        }
    }

    pub async fn continuation_token(&self, user_id: &str, provider_id: &str) -> Option<String> {
        let slot = self.existing(user_id).await?;
        let ctx = slot.context.lock().await;
        ctx.continuation_tokens.get(provider_id).cloned()
    }

    /// Forget the user's history, tokens and pending state.
    ///
    /// The slot itself survives so a question already waiting on the turn
    /// gate keeps a valid lock; its commit will be rejected.
    pub async fn clear(&self, user_id: &str) {
        let Some(slot) = self.existing(user_id).await else {
            return;
        };
        let mut ctx = slot.context.lock().await;
        ctx.turns.clear();
        ctx.continuation_tokens.clear();
        ctx.state = UserState::Idle;
        ctx.generation = self.next_generation();
        debug!(user_id = %user_id, generation = ctx.generation, "Conversation cleared");
    }

    /// Append `turn` (and store the provider's token) only if the context was
    /// not cleared since `generation` was returned by
    /// [`ConversationStore::append`]. Returns whether it landed.
    pub async fn commit(
        &self,
        user_id: &str,
        generation: u64,
        turn: ConversationTurn,
        token: Option<(&str, String)>,
    ) -> bool {
        let slot = self.slot(user_id).await;
        let mut ctx = slot.context.lock().await;
        if ctx.generation != generation {
            debug!(
                user_id = %user_id,
                expected = generation,
                current = ctx.generation,
                "Discarding stale commit"
            );
            return false;
        }

        self.push(&mut ctx, turn);
        if let Some((provider_id, token)) = token {
            ctx.continuation_tokens.insert(provider_id.to_string(), token);
        }
        true
    }

    /// Wait until no other question from this user is in flight.
    pub async fn begin_turn(&self, user_id: &str) -> TurnGuard {
        let gate = self.slot(user_id).await.turn_gate.clone();
        gate.lock_owned().await
    }

    pub async fn user_state(&self, user_id: &str) -> UserState {
        match self.existing(user_id).await {
            Some(slot) => slot.context.lock().await.state,
            None => UserState::Idle,
        }
    }

    /// Apply `event` to the user's state and return the new state.
    pub async fn transition(&self, user_id: &str, event: UserEvent) -> UserState {
        let slot = self.slot(user_id).await;
        let mut ctx = slot.context.lock().await;
        let next = ctx.state.on(event);
        if next != ctx.state {
            debug!(user_id = %user_id, from = ?ctx.state, to = ?next, "User state changed");
        }
        ctx.state = next;
        next
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

/// Drop the oldest non-system turns until at most `max` remain.
fn trim(turns: &mut Vec<ConversationTurn>, max: usize) {
    let excess = turns.len().saturating_sub(max);
    if excess == 0 {
        return;
    }
    let start = usize::from(turns.first().is_some_and(|t| t.is_system()));
    let end = (start + excess).min(turns.len());
    turns.drain(start..end);
}
