//! The transactional room service.
//!
//! Every mutation here is one store transaction: load, run the aggregate
//! method, commit. The aggregate enforces the rules; this layer supplies
//! the code allocation, the catalog reads, the retry handling, and the
//! bookkeeping around emptied rooms.

use std::sync::Arc;

use chrono::Utc;

use quizcast_protocol::{GameSummary, PlayerId, RoomCode, RoomSettings, RoomSnapshot};
use quizcast_store::{Store, StoreError, TxError};

use crate::{
    AllocError, CodeAllocator, NewPlayer, QuestionCatalog, Removal, Room, RoomCache,
    RoomError, ServiceError,
};

/// Attempts at re-running a mutation after a mid-transaction abort.
const TX_RETRY_LIMIT: u32 = 3;

/// Attempts at inserting a freshly generated code before giving up.
/// Each attempt re-probes the whole code space, so hitting this limit
/// means the store is effectively full.
const INSERT_RETRY_LIMIT: u32 = 3;

/// Room lifecycle operations over store `S` and catalog `C`.
pub struct RoomLifecycle<S, C> {
    cache: Arc<RoomCache<S>>,
    catalog: Arc<C>,
    allocator: CodeAllocator,
}

impl<S, C> RoomLifecycle<S, C>
where
    S: Store<RoomCode, Room>,
    C: QuestionCatalog,
{
    pub fn new(cache: Arc<RoomCache<S>>, catalog: Arc<C>) -> Self {
        Self {
            cache,
            catalog,
            allocator: CodeAllocator::default(),
        }
    }

    /// Overrides the default code allocator.
    pub fn with_allocator(mut self, allocator: CodeAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    /// The room cache, shared with the answer processor and the gateway.
    pub fn cache(&self) -> &Arc<RoomCache<S>> {
        &self.cache
    }

    /// Creates a room: validates settings, draws the question sequence,
    /// allocates a unique code, and stores the new aggregate.
    ///
    /// The allocator only probes; the insert is what actually claims the
    /// code. A concurrent creation that wins the race surfaces as a
    /// duplicate insert, and we re-allocate rather than fail the caller.
    pub async fn create_room(
        &self,
        host: NewPlayer,
        settings: Option<RoomSettings>,
    ) -> Result<RoomSnapshot, ServiceError> {
        let settings = settings.unwrap_or_default();
        settings.validate()?;
        let question_ids = self.catalog.pick_questions(&settings).await?;

        for attempt in 1..=INSERT_RETRY_LIMIT {
            let code = self
                .allocator
                .generate_unique(|candidate| async move {
                    self.cache.exists(&candidate).await
                })
                .await
                .map_err(|e| match e {
                    AllocError::Exhausted { attempts } => ServiceError::Exhausted { attempts },
                    AllocError::Probe(e) => ServiceError::Store(e),
                })?;

            let room = Room::new(
                code.clone(),
                host.clone(),
                settings.clone(),
                question_ids.clone(),
                Utc::now(),
            );
            let snapshot = room.snapshot();
            match self.cache.insert(code.clone(), room).await {
                Ok(()) => {
                    tracing::info!(%code, host = %host.id, "room created");
                    return Ok(snapshot);
                }
                Err(StoreError::Duplicate) if attempt < INSERT_RETRY_LIMIT => {
                    tracing::warn!(%code, attempt, "room code claimed concurrently; re-allocating");
                }
                Err(StoreError::Duplicate) => {
                    return Err(RoomError::CodeTaken(code).into());
                }
                Err(e) => return Err(ServiceError::Store(e)),
            }
        }
        Err(ServiceError::Exhausted {
            attempts: INSERT_RETRY_LIMIT,
        })
    }

    /// Adds a player to a waiting room.
    pub async fn join(
        &self,
        code: &RoomCode,
        profile: NewPlayer,
    ) -> Result<RoomSnapshot, ServiceError> {
        let (room, _) = self
            .update_room(code, |room| room.join(profile.clone()).map(|_| ()))
            .await?;
        tracing::info!(%code, player = %profile.id, "player joined");
        Ok(room.snapshot())
    }

    /// Removes a player (leave or disconnect). Promotes a new host when
    /// needed; an emptied room finishes and its document is deleted.
    pub async fn leave(
        &self,
        code: &RoomCode,
        player: PlayerId,
    ) -> Result<(Removal, RoomSnapshot), ServiceError> {
        let (room, removal) = self
            .update_room(code, |room| room.remove_player(player, Utc::now()))
            .await?;
        tracing::info!(%code, %player, new_host = ?removal.new_host, "player removed");
        if removal.finished {
            self.discard(code).await;
        }
        Ok((removal, room.snapshot()))
    }

    /// Host removes another member.
    pub async fn kick(
        &self,
        code: &RoomCode,
        acting: PlayerId,
        target: PlayerId,
    ) -> Result<(Removal, RoomSnapshot), ServiceError> {
        let (room, removal) = self
            .update_room(code, |room| room.kick(acting, target, Utc::now()))
            .await?;
        tracing::info!(%code, %acting, %target, "player kicked");
        Ok((removal, room.snapshot()))
    }

    /// Flips a member's ready flag.
    pub async fn set_ready(
        &self,
        code: &RoomCode,
        player: PlayerId,
        ready: bool,
    ) -> Result<RoomSnapshot, ServiceError> {
        let (room, _) = self
            .update_room(code, |room| room.set_ready(player, ready))
            .await?;
        Ok(room.snapshot())
    }

    /// Replaces the settings of a waiting room, redrawing the question
    /// sequence to match.
    pub async fn update_settings(
        &self,
        code: &RoomCode,
        by: PlayerId,
        settings: RoomSettings,
    ) -> Result<RoomSnapshot, ServiceError> {
        settings.validate()?;
        let question_ids = self.catalog.pick_questions(&settings).await?;
        let (room, _) = self
            .update_room(code, |room| {
                room.update_settings(by, settings.clone(), question_ids.clone())
            })
            .await?;
        tracing::info!(%code, %by, "room settings updated");
        Ok(room.snapshot())
    }

    /// Starts the game.
    pub async fn start(
        &self,
        code: &RoomCode,
        by: PlayerId,
    ) -> Result<RoomSnapshot, ServiceError> {
        let (room, _) = self
            .update_room(code, |room| room.start(by, Utc::now()))
            .await?;
        tracing::info!(%code, %by, questions = room.question_ids.len(), "game started");
        Ok(room.snapshot())
    }

    /// Ends an active game early, computing final standings.
    pub async fn finish(
        &self,
        code: &RoomCode,
    ) -> Result<(GameSummary, RoomSnapshot), ServiceError> {
        let (room, summary) = self
            .update_room(code, |room| room.finish(Utc::now()).cloned())
            .await?;
        tracing::info!(%code, winner = ?summary.winner, "game finished");
        Ok((summary, room.snapshot()))
    }

    /// Loads the full aggregate.
    pub async fn room(&self, code: &RoomCode) -> Result<Room, ServiceError> {
        self.cache
            .get(code)
            .await
            .map_err(ServiceError::Store)?
            .ok_or_else(|| RoomError::NotFound(code.clone()).into())
    }

    /// Loads the client-facing view.
    pub async fn snapshot(&self, code: &RoomCode) -> Result<RoomSnapshot, ServiceError> {
        Ok(self.room(code).await?.snapshot())
    }

    async fn update_room<T, F>(
        &self,
        code: &RoomCode,
        mutate: F,
    ) -> Result<(Room, T), ServiceError>
    where
        F: Fn(&mut Room) -> Result<T, RoomError> + Send + Sync,
        T: Send,
    {
        update_with_retry(&self.cache, code, mutate).await
    }

    /// Best-effort deletion of a finished room's document.
    async fn discard(&self, code: &RoomCode) {
        match self.cache.remove(code).await {
            Ok(true) => tracing::info!(%code, "room emptied and removed"),
            Ok(false) => {}
            Err(e) => tracing::warn!(%code, error = %e, "failed to remove finished room"),
        }
    }
}

/// Runs `mutate` in a store transaction scoped to `code`, retrying a
/// bounded number of times when the transaction aborts underneath us.
/// A missing document maps to the domain's not-found rejection.
pub(crate) async fn update_with_retry<S, T, F>(
    cache: &RoomCache<S>,
    code: &RoomCode,
    mutate: F,
) -> Result<(Room, T), ServiceError>
where
    S: Store<RoomCode, Room>,
    F: Fn(&mut Room) -> Result<T, RoomError> + Send + Sync,
    T: Send,
{
    let mut attempt = 1;
    loop {
        match cache.update(code, &mutate).await {
            Ok(result) => return Ok(result),
            Err(TxError::Store(StoreError::TransactionAborted(reason)))
                if attempt < TX_RETRY_LIMIT =>
            {
                tracing::debug!(%code, attempt, %reason, "room transaction aborted; retrying");
                attempt += 1;
            }
            Err(TxError::Store(StoreError::NotFound)) => {
                return Err(RoomError::NotFound(code.clone()).into());
            }
            Err(e) => return Err(e.into()),
        }
    }
}
