//! Respawn cycle manager: batches dead players and bots onto a transport
//! shuttle and runs the Waiting → Transporting → Returning loop
//!
//! The manager runs once per simulation tick against an injected
//! [`SessionContext`]; it never reaches into global state. Externally
//! observable transitions raise a broadcast through the [`CycleObserver`]
//! capability and mark the manager dirty for the network scheduler. All
//! deadlines are wall-clock instants, so the cycle tolerates variable tick
//! rates and pauses. Without a shuttle the cycle degenerates to immediate
//! in-place respawns aboard the main sub.

use log::debug;
use shared::bitio::BitWriter;
use shared::{
    RespawnState, DEFAULT_CRUSH_DEPTH, DESPAWN_GRACE_SECS, SHAFT_HEIGHT,
    SHUTTLE_EMPTY_DEBOUNCE_SECS, SHUTTLE_RETURN_PROXIMITY,
    SKILL_REGRESSION_ON_MIDROUND_RESPAWN,
};
use std::time::{Duration, Instant};

use crate::character::{Campaign, CharacterId, CharacterInfo, CharacterRoster, Job, JobPrefab, TeamId};
use crate::client_manager::ClientManager;
use crate::settings::{BotSpawnMode, ServerSettings};
use crate::tasks::{ForceShuttleToPos, TaskManager};
use crate::world::{ItemCatalog, Level, Shuttle, SpawnPoint, SpawnType, Submarine, Vec2};

const FORCE_POS_TASK: &str = "forcepos";
const FORCE_POS_SPEED: f32 = 100.0;

/// Server-side hooks driven on externally observable transitions.
/// Non-authoritative instances supply [`NullObserver`] and merely observe.
pub trait CycleObserver {
    /// A state change all connected clients must be told about
    fn broadcast(&mut self);
    fn log_event(&mut self, message: &str);
}

/// Observe-only implementation for instances without broadcast authority
pub struct NullObserver;

impl CycleObserver for NullObserver {
    fn broadcast(&mut self) {}
    fn log_event(&mut self, _message: &str) {}
}

/// Assigns jobs to a batch of clients about to respawn
pub trait JobAssigner {
    fn assign_jobs(&mut self, clients: &mut ClientManager, ids: &[u32]);
}

/// Deals jobs out in a fixed rotation
pub struct RoundRobinAssigner {
    jobs: Vec<JobPrefab>,
    next: usize,
}

impl RoundRobinAssigner {
    pub fn new(jobs: Vec<JobPrefab>) -> Self {
        Self { jobs, next: 0 }
    }
}

impl JobAssigner for RoundRobinAssigner {
    fn assign_jobs(&mut self, clients: &mut ClientManager, ids: &[u32]) {
        if self.jobs.is_empty() {
            return;
        }
        for id in ids {
            if let Some(client) = clients.get_mut(*id) {
                client.assigned_job = Some(self.jobs[self.next % self.jobs.len()].clone());
                self.next += 1;
            }
        }
    }
}

/// Selects one spawn point per character info, aligned to the input order
pub trait SpawnPointSelector {
    fn select_crew_spawn_points(
        &self,
        infos: &[CharacterInfo],
        points: &[SpawnPoint],
        fallback: Vec2,
    ) -> Vec<SpawnPoint>;
}

/// Prefers berths matching the character's job, then any free human berth
pub struct DefaultSpawnSelector;

impl SpawnPointSelector for DefaultSpawnSelector {
    fn select_crew_spawn_points(
        &self,
        infos: &[CharacterInfo],
        points: &[SpawnPoint],
        fallback: Vec2,
    ) -> Vec<SpawnPoint> {
        let human: Vec<&SpawnPoint> = points
            .iter()
            .filter(|p| p.spawn_type == SpawnType::Human)
            .collect();
        let mut used = vec![false; human.len()];

        infos
            .iter()
            .map(|info| {
                let job_id = info.job.as_ref().map(|j| j.prefab.identifier.as_str());
                let index = job_id
                    .and_then(|id| {
                        human
                            .iter()
                            .enumerate()
                            .position(|(i, p)| !used[i] && p.job.as_deref() == Some(id))
                    })
                    .or_else(|| used.iter().position(|u| !u));
                match index {
                    Some(i) => {
                        used[i] = true;
                        human[i].clone()
                    }
                    None => human
                        .first()
                        .map(|p| (*p).clone())
                        .unwrap_or_else(|| SpawnPoint::human(fallback)),
                }
            })
            .collect()
    }
}

/// Everything the cycle manager needs from the surrounding session,
/// injected per update instead of read from globals
pub struct SessionContext<'a> {
    pub clients: &'a mut ClientManager,
    pub characters: &'a mut CharacterRoster,
    /// Present only in campaign mode; bots do not respawn in campaigns
    pub campaign: Option<&'a mut Campaign>,
    pub settings: &'a ServerSettings,
    pub level: &'a Level,
    pub main_sub: &'a Submarine,
    pub jobs: &'a mut dyn JobAssigner,
    pub spawn_selector: &'a dyn SpawnPointSelector,
    pub catalog: &'a dyn ItemCatalog,
}

/// An auxiliary item spawned alongside a respawn batch, for broadcast bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnedItem {
    pub identifier: String,
    pub position: Vec2,
    /// Item this one was combined into on spawn (oxygen tank into suit, battery into scooter)
    pub combined_with: Option<String>,
}

pub struct RespawnManager {
    state: RespawnState,
    shuttle: Option<Shuttle>,
    tasks: TaskManager,

    respawn_time: Instant,
    return_time: Instant,
    despawn_time: Instant,
    respawn_countdown_started: bool,
    return_countdown_started: bool,
    max_transport_time: f32,
    shuttle_empty_timer: f32,

    pending_respawn_count: usize,
    required_respawn_count: usize,
    prev_pending_respawn_count: usize,
    prev_required_respawn_count: usize,

    respawned_characters: Vec<CharacterId>,
    respawn_items: Vec<SpawnedItem>,
    unsent_changes: bool,
}

impl RespawnManager {
    pub fn new(shuttle: Option<Shuttle>, settings: &ServerSettings) -> Self {
        let now = Instant::now();
        Self {
            state: RespawnState::Waiting,
            shuttle,
            tasks: TaskManager::new(),
            respawn_time: now,
            return_time: now,
            despawn_time: now,
            respawn_countdown_started: false,
            return_countdown_started: false,
            max_transport_time: settings.max_transport_time,
            shuttle_empty_timer: 0.0,
            pending_respawn_count: 0,
            required_respawn_count: 0,
            prev_pending_respawn_count: 0,
            prev_required_respawn_count: 0,
            respawned_characters: Vec::new(),
            respawn_items: Vec::new(),
            unsent_changes: false,
        }
    }

    pub fn state(&self) -> RespawnState {
        self.state
    }

    pub fn shuttle(&self) -> Option<&Shuttle> {
        self.shuttle.as_ref()
    }

    pub fn pending_respawn_count(&self) -> usize {
        self.pending_respawn_count
    }

    pub fn required_respawn_count(&self) -> usize {
        self.required_respawn_count
    }

    pub fn respawn_countdown_started(&self) -> bool {
        self.respawn_countdown_started
    }

    pub fn return_countdown_started(&self) -> bool {
        self.return_countdown_started
    }

    /// Characters created by the most recent batch respawn
    pub fn respawned_characters(&self) -> &[CharacterId] {
        &self.respawned_characters
    }

    /// Auxiliary items created by the most recent batch respawn
    pub fn respawn_items(&self) -> &[SpawnedItem] {
        &self.respawn_items
    }

    /// Returns and clears the dirty flag; the scheduler serializes per client when true
    pub fn take_unsent_changes(&mut self) -> bool {
        std::mem::take(&mut self.unsent_changes)
    }

    fn create_event(&mut self, observer: &mut dyn CycleObserver) {
        self.unsent_changes = true;
        observer.broadcast();
    }

    /// Clients eligible for the next respawn batch
    pub fn clients_to_respawn(&self, ctx: &SessionContext) -> Vec<u32> {
        let mut eligible = Vec::new();
        if ctx.settings.override_respawn_sub {
            return eligible;
        }
        for client in ctx.clients.iter() {
            if !client.in_game {
                continue;
            }
            if client.spectate_only && (ctx.settings.allow_spectating || client.is_owner) {
                continue;
            }
            if let Some(id) = client.character {
                if ctx.characters.get(id).map(|c| !c.is_dead).unwrap_or(false) {
                    continue;
                }
            }

            let matching_data = ctx
                .campaign
                .as_deref()
                .and_then(|c| c.get_character_data(client.id));

            // a client whose campaign character still lives regains control once in sync
            if let Some(data) = matching_data {
                if data.has_spawned && ctx.characters.any_alive_with_info(&data.info) {
                    continue;
                }
            }

            if ctx.settings.use_respawn_prompt {
                if let Some(data) = matching_data {
                    if data.has_spawned && client.wait_for_next_round_respawn.unwrap_or(true) {
                        continue;
                    }
                }
            }

            eligible.push(client.id);
        }
        // roster iteration order is unspecified, keep batches reproducible
        eligible.sort_unstable();
        eligible
    }

    /// True if this client still has an unanswered mid-round respawn prompt
    pub fn is_respawn_prompt_pending_for(&self, ctx: &SessionContext, client_id: u32) -> bool {
        if !ctx.settings.use_respawn_prompt {
            return false;
        }
        let Some(campaign) = ctx.campaign.as_deref() else {
            return false;
        };
        let Some(client) = ctx.clients.get(client_id) else {
            return false;
        };

        if !client.in_game {
            return false;
        }
        if client.spectate_only && (ctx.settings.allow_spectating || client.is_owner) {
            return false;
        }
        if let Some(id) = client.character {
            if ctx.characters.get(id).map(|c| !c.is_dead).unwrap_or(false) {
                return false;
            }
        }

        if let Some(data) = campaign.get_character_data(client_id) {
            if data.has_spawned {
                if ctx.characters.any_alive_with_info(&data.info) {
                    return false;
                }
                return client.wait_for_next_round_respawn.is_none();
            }
        }
        false
    }

    /// Bot infos to include in the next respawn batch
    fn bots_to_respawn(&self, ctx: &SessionContext) -> Vec<CharacterInfo> {
        if ctx.settings.bot_spawn_mode == BotSpawnMode::Normal {
            return ctx
                .characters
                .iter()
                .filter(|c| c.team == TeamId::Team1 && c.is_bot && c.is_dead)
                .map(|c| c.info.clone())
                .collect();
        }

        let curr_player_count = ctx
            .clients
            .iter()
            .filter(|c| {
                c.in_game
                    && (!c.spectate_only || (!ctx.settings.allow_spectating && !c.is_owner))
            })
            .count();

        let existing_bots: Vec<(&CharacterInfo, bool)> = ctx
            .characters
            .iter()
            .filter(|c| c.team == TeamId::Team1 && c.is_bot)
            .map(|c| (&c.info, c.is_dead))
            .collect();

        let alive_bots = existing_bots.iter().filter(|(_, dead)| !dead).count();
        let required = ctx
            .settings
            .bot_count
            .saturating_sub(curr_player_count)
            .saturating_sub(alive_bots);

        // recycle dead bots' identity records before inventing new ones
        let mut dead_pool: Vec<&CharacterInfo> = existing_bots
            .iter()
            .filter(|(_, dead)| *dead)
            .map(|(info, _)| *info)
            .collect();

        let mut bots = Vec::with_capacity(required);
        for i in 0..required {
            match dead_pool.pop() {
                Some(info) => bots.push(info.clone()),
                None => bots.push(CharacterInfo::new(&format!("Bot {}", i + 1))),
            }
        }
        bots
    }

    fn min_characters_to_respawn(&self, ctx: &SessionContext) -> usize {
        ((ctx.clients.len() as f32 * ctx.settings.min_respawn_ratio) as usize).max(1)
    }

    fn should_start_respawn_countdown(&self, mut pending: usize, ctx: &SessionContext) -> bool {
        if ctx.settings.override_respawn_sub {
            pending = 0;
        }
        pending >= self.min_characters_to_respawn(ctx)
    }

    /// Runs one tick of the cycle
    pub fn update(&mut self, dt: f32, ctx: &mut SessionContext, observer: &mut dyn CycleObserver) {
        if let Some(shuttle) = self.shuttle.as_mut() {
            self.tasks.update(shuttle, dt);
        }

        match self.state {
            RespawnState::Waiting => self.update_waiting(ctx, observer),
            RespawnState::Transporting => self.update_transporting(dt, ctx, observer),
            RespawnState::Returning => self.update_returning(dt, ctx, observer),
        }
    }

    fn update_waiting(&mut self, ctx: &mut SessionContext, observer: &mut dyn CycleObserver) {
        if !ctx.settings.override_respawn_sub {
            if let Some(shuttle) = self.shuttle.as_mut() {
                shuttle.velocity = Vec2::ZERO;
            }
        }

        self.pending_respawn_count = self.clients_to_respawn(ctx).len();
        self.required_respawn_count = self.min_characters_to_respawn(ctx);
        if self.pending_respawn_count != self.prev_pending_respawn_count
            || self.required_respawn_count != self.prev_required_respawn_count
        {
            self.prev_pending_respawn_count = self.pending_respawn_count;
            self.prev_required_respawn_count = self.required_respawn_count;
            self.create_event(observer);
        }

        if self.respawn_countdown_started {
            if self.pending_respawn_count == 0 {
                self.respawn_countdown_started = false;
                self.create_event(observer);
            }
        } else if self.should_start_respawn_countdown(self.pending_respawn_count, ctx) {
            self.respawn_countdown_started = true;
            let now = Instant::now();
            if self.respawn_time < now {
                self.respawn_time = now + Duration::from_secs_f32(ctx.settings.respawn_interval);
            }
            self.create_event(observer);
        }

        if self.respawn_countdown_started && Instant::now() > self.respawn_time {
            self.dispatch_shuttle(ctx, observer);
            self.respawn_countdown_started = false;
        }
    }

    /// Sends the shuttle out with the current batch, or respawns the batch
    /// in place when no shuttle is installed
    pub fn dispatch_shuttle(&mut self, ctx: &mut SessionContext, observer: &mut dyn CycleObserver) {
        if self.shuttle.is_some() {
            self.state = if ctx.settings.override_respawn_sub {
                RespawnState::Waiting
            } else {
                RespawnState::Transporting
            };
            self.return_countdown_started = false;
            self.shuttle_empty_timer = 0.0;
            self.return_time = Instant::now() + Duration::from_secs_f32(self.max_transport_time);
            self.despawn_time = self.return_time + Duration::from_secs_f32(DESPAWN_GRACE_SECS);
            self.create_event(observer);

            if let Some(shuttle) = self.shuttle.as_mut() {
                shuttle.reset();
            }
            observer.log_event("Dispatching the respawn shuttle.");

            let spawn_pos = self.find_spawn_pos(ctx.level);
            if !ctx.settings.override_respawn_sub {
                self.respawn_characters(Some(spawn_pos), ctx, observer);
            }

            self.tasks.stop_named(FORCE_POS_TASK);
            if spawn_pos.y > ctx.level.size.y {
                self.tasks.start(
                    Box::new(ForceShuttleToPos::new(
                        ctx.level.shuttle_arrival_position(),
                        FORCE_POS_SPEED,
                    )),
                    FORCE_POS_TASK,
                );
            } else if let Some(shuttle) = self.shuttle.as_mut() {
                shuttle.set_position(spawn_pos);
                shuttle.neutral_ballast = true;
                shuttle.maintain_position = true;
            }
        } else {
            self.state = RespawnState::Waiting;
            observer.log_event("Respawning everyone in the main sub.");
            self.create_event(observer);
            self.respawn_characters(None, ctx, observer);
        }
    }

    fn find_spawn_pos(&self, level: &Level) -> Vec2 {
        let extents = self.shuttle.as_ref().map(|s| s.extents).unwrap_or(Vec2::ZERO);
        Vec2::new(level.start_position.x, level.size.y + extents.y)
    }

    fn update_transporting(
        &mut self,
        dt: f32,
        ctx: &mut SessionContext,
        observer: &mut dyn CycleObserver,
    ) {
        if !self.return_countdown_started {
            if self.check_shuttle_empty(dt, ctx) {
                // nobody alive aboard, transporting can stop immediately
                self.return_time = Instant::now();
                self.return_countdown_started = true;
            } else if !self.should_start_respawn_countdown(self.clients_to_respawn(ctx).len(), ctx)
            {
                // don't start counting down until someone else needs to respawn
                self.return_time =
                    Instant::now() + Duration::from_secs_f32(self.max_transport_time);
                self.despawn_time = self.return_time + Duration::from_secs_f32(DESPAWN_GRACE_SECS);
                return;
            } else {
                self.return_countdown_started = true;
                self.create_event(observer);
            }
        } else if self.check_shuttle_empty(dt, ctx) {
            self.return_time = Instant::now();
        }

        if Instant::now() > self.return_time {
            observer.log_event("The respawn shuttle is leaving.");
            self.state = RespawnState::Returning;
            self.create_event(observer);
            self.respawn_countdown_started = false;
            self.max_transport_time = ctx.settings.max_transport_time;
        }
    }

    fn update_returning(
        &mut self,
        dt: f32,
        ctx: &mut SessionContext,
        observer: &mut dyn CycleObserver,
    ) {
        let now = Instant::now();
        let grace = Duration::from_secs_f32(DESPAWN_GRACE_SECS);

        // speed up despawning if there's no-one inside the shuttle
        if self.despawn_time > now + grace && self.check_shuttle_empty(dt, ctx) {
            self.despawn_time = now + grace;
        }

        let (position, extents, path_finished) = match self.shuttle.as_mut() {
            Some(shuttle) => {
                shuttle.close_all_doors();
                shuttle.hull_breaches = 0;
                shuttle.undock_all();
                (shuttle.position, shuttle.extents, shuttle.steering_path_finished)
            }
            None => {
                self.state = RespawnState::Waiting;
                return;
            }
        };

        // returned once the path is traversed or the shuttle is close enough to the exit
        if !self.tasks.is_running(FORCE_POS_TASK) {
            let near_exit = position.y + extents.y > ctx.level.start_position.y - SHAFT_HEIGHT
                && (ctx.level.start_position.x - position.x).abs() < SHUTTLE_RETURN_PROXIMITY;
            if path_finished || near_exit {
                self.tasks.start(
                    Box::new(ForceShuttleToPos::new(
                        ctx.level.shuttle_exit_position(),
                        FORCE_POS_SPEED,
                    )),
                    FORCE_POS_TASK,
                );
            }
        }

        if position.y > ctx.level.size.y || now > self.despawn_time {
            self.tasks.stop_named(FORCE_POS_TASK);
            if let Some(shuttle) = self.shuttle.as_mut() {
                shuttle.reset();
            }
            self.state = RespawnState::Waiting;
            observer.log_event("The respawn shuttle has left.");
            self.create_event(observer);
            self.respawn_countdown_started = false;
            self.return_countdown_started = false;
        }
    }

    /// Debounced occupancy check: the shuttle counts as empty only after a
    /// full second without a living character aboard
    fn check_shuttle_empty(&mut self, dt: f32, ctx: &SessionContext) -> bool {
        if ctx.characters.any_alive_aboard_shuttle() {
            self.shuttle_empty_timer = 0.0;
        } else {
            self.shuttle_empty_timer += dt;
        }
        self.shuttle_empty_timer > SHUTTLE_EMPTY_DEBOUNCE_SECS
    }

    /// Spawns the current batch of eligible clients and bots in one pass
    fn respawn_characters(
        &mut self,
        shuttle_pos: Option<Vec2>,
        ctx: &mut SessionContext,
        observer: &mut dyn CycleObserver,
    ) {
        self.respawned_characters.clear();
        self.respawn_items.clear();

        let client_ids = self.clients_to_respawn(ctx);

        for id in &client_ids {
            let campaign_info = ctx
                .campaign
                .as_deref()
                .and_then(|c| c.get_character_data(*id))
                .map(|d| d.info.clone());

            let stale_character = match ctx.clients.get_mut(*id) {
                Some(client) => {
                    client.wait_for_next_round_respawn = None;
                    if let Some(info) = campaign_info {
                        client.character_info = Some(info);
                    }
                    // single-team respawn: everyone comes back on the crew team
                    client.team = TeamId::Team1;
                    if client.character_info.is_none() {
                        client.character_info = Some(CharacterInfo::new(&client.name));
                    }
                    client.character.take()
                }
                None => None,
            };
            if let Some(character_id) = stale_character {
                ctx.characters.despawn_now(character_id);
            }
        }

        let mut infos: Vec<CharacterInfo> = client_ids
            .iter()
            .filter_map(|id| ctx.clients.get(*id).and_then(|c| c.character_info.clone()))
            .collect();

        // bots don't respawn in the campaign
        if ctx.campaign.is_none() {
            infos.extend(self.bots_to_respawn(ctx));
        }

        ctx.jobs.assign_jobs(ctx.clients, &client_ids);
        for (i, id) in client_ids.iter().enumerate() {
            let has_campaign_data = ctx
                .campaign
                .as_deref()
                .map(|c| c.get_character_data(*id).is_some())
                .unwrap_or(false);
            if let Some(client) = ctx.clients.get_mut(*id) {
                let missing_job = client
                    .character_info
                    .as_ref()
                    .map(|info| info.job.is_none())
                    .unwrap_or(true);
                if !has_campaign_data || missing_job {
                    if let Some(prefab) = client.assigned_job.clone() {
                        let job = Job::from_prefab(prefab);
                        if let Some(info) = client.character_info.as_mut() {
                            info.job = Some(job.clone());
                        }
                        infos[i].job = Some(job);
                    }
                }
            }
        }

        let (respawn_points, respawn_fallback) = match &self.shuttle {
            Some(shuttle) => (shuttle.spawn_points.clone(), shuttle.position),
            None => (ctx.main_sub.spawn_points.clone(), ctx.main_sub.position),
        };
        // spawn points aboard the transport, and the berths these characters
        // would have had in the main sub (for correct ID card tags and items)
        let shuttle_spawn_points =
            ctx.spawn_selector
                .select_crew_spawn_points(&infos, &respawn_points, respawn_fallback);
        let main_sub_spawn_points = ctx.spawn_selector.select_crew_spawn_points(
            &infos,
            &ctx.main_sub.spawn_points,
            ctx.main_sub.position,
        );

        let deep = shuttle_pos
            .map(|p| ctx.level.real_world_depth(p.y) > DEFAULT_CRUSH_DEPTH)
            .unwrap_or(false)
            || ctx.level.real_world_depth(ctx.main_sub.position.y) > DEFAULT_CRUSH_DEPTH;
        let mut diving_suit = if deep {
            ctx.catalog.find_by_tag("respawnsuitdeep").cloned()
        } else {
            None
        };
        if diving_suit.is_none() {
            diving_suit = ctx
                .catalog
                .find_by_tag("respawnsuit")
                .or_else(|| ctx.catalog.find_by_identifier("divingsuit"))
                .cloned();
        }
        let oxy_prefab = ctx.catalog.find_by_identifier("oxygentank").cloned();
        let scooter_prefab = ctx.catalog.find_by_identifier("underwaterscooter").cloned();
        let battery_prefab = ctx.catalog.find_by_identifier("batterycell").cloned();
        let cargo_pos = self
            .shuttle
            .as_ref()
            .and_then(|s| s.cargo_spawn_point())
            .map(|sp| sp.position);

        for i in 0..infos.len() {
            let bot = i >= client_ids.len();
            infos[i].clear_current_orders();

            let mut force_spawn_in_main_sub = false;
            if !bot {
                if let Some(campaign) = ctx.campaign.as_deref() {
                    if let Some(data) = campaign.get_character_data(client_ids[i]) {
                        if !data.has_spawned {
                            force_spawn_in_main_sub = true;
                        } else {
                            reduce_character_skills(&mut infos[i]);
                            infos[i].saved_stat_values.clear();
                            infos[i].cause_of_death = None;
                        }
                    }
                }
            }

            let spawn_point = if force_spawn_in_main_sub {
                &main_sub_spawn_points[i]
            } else {
                &shuttle_spawn_points[i]
            };
            let aboard_shuttle = self.shuttle.is_some() && !force_spawn_in_main_sub;
            let character_id = ctx.characters.spawn(
                infos[i].clone(),
                spawn_point.position,
                TeamId::Team1,
                bot,
                aboard_shuttle,
            );
            self.respawned_characters.push(character_id);

            let job_name = infos[i]
                .job
                .as_ref()
                .map(|j| j.prefab.name.clone())
                .unwrap_or_else(|| "Assistant".to_string());
            if bot {
                observer.log_event(&format!("Respawning bot {} as {}", infos[i].name, job_name));
            } else if let Some(client) = ctx.clients.get_mut(client_ids[i]) {
                client.character = Some(character_id);
                if let Some(character) = ctx.characters.get_mut(character_id) {
                    character.owner_client = Some(client.id);
                }
                observer.log_event(&format!("Respawning {} as {}", client.name, job_name));
            }

            if self.shuttle.is_some() {
                if let (Some(suit), Some(oxy)) = (&diving_suit, &oxy_prefab) {
                    let pos = cargo_pos.unwrap_or(spawn_point.position);
                    self.respawn_items.push(SpawnedItem {
                        identifier: suit.identifier.clone(),
                        position: pos,
                        combined_with: None,
                    });
                    self.respawn_items.push(SpawnedItem {
                        identifier: oxy.identifier.clone(),
                        position: pos,
                        combined_with: Some(suit.identifier.clone()),
                    });
                    if let (Some(scooter), Some(battery)) = (&scooter_prefab, &battery_prefab) {
                        self.respawn_items.push(SpawnedItem {
                            identifier: scooter.identifier.clone(),
                            position: pos,
                            combined_with: None,
                        });
                        self.respawn_items.push(SpawnedItem {
                            identifier: battery.identifier.clone(),
                            position: pos,
                            combined_with: Some(scooter.identifier.clone()),
                        });
                    }
                }
            }

            let campaign_data = if bot {
                None
            } else {
                ctx.campaign
                    .as_deref()
                    .and_then(|c| c.get_character_data(client_ids[i]))
                    .cloned()
            };

            match campaign_data {
                None => {
                    if let Some(character) = ctx.characters.get_mut(character_id) {
                        character.give_job_items(&main_sub_spawn_points[i]);
                    }
                    if !bot {
                        if let Some(campaign) = ctx.campaign.as_deref_mut() {
                            let data =
                                campaign.set_character_data(client_ids[i], infos[i].clone());
                            data.has_spawned = true;
                        }
                    }
                }
                Some(data) if data.has_spawned => {
                    // returning mid-round: fresh job-default loadout
                    if let Some(character) = ctx.characters.get_mut(character_id) {
                        character.give_job_items(&main_sub_spawn_points[i]);
                    }
                    if let Some(campaign) = ctx.campaign.as_deref_mut() {
                        let stored = campaign.set_character_data(client_ids[i], infos[i].clone());
                        stored.has_spawned = true;
                    }
                }
                Some(data) => {
                    // first spawn of a persisted character: restore what was saved
                    if let Some(character) = ctx.characters.get_mut(character_id) {
                        if data.has_item_data() {
                            data.spawn_inventory_items(character);
                        } else {
                            character.give_job_items(&main_sub_spawn_points[i]);
                        }
                        data.apply_health_data(character);
                        character.give_id_card_tags(&main_sub_spawn_points[i]);
                    }
                    if let Some(campaign) = ctx.campaign.as_deref_mut() {
                        if let Some(stored) = campaign.get_character_data_mut(client_ids[i]) {
                            stored.has_spawned = true;
                        }
                    }
                }
            }

            // tags the character should have gotten from the transport berth
            if let Some(character) = ctx.characters.get_mut(character_id) {
                character.give_id_card_tags(&shuttle_spawn_points[i]);
            }
        }

        debug!(
            "Respawned {} characters ({} clients, {} bots)",
            infos.len(),
            client_ids.len(),
            infos.len() - client_ids.len()
        );
    }

    /// Serializes the cycle state for one receiving client.
    /// Field order and widths must match the client-side decoder.
    pub fn server_event_write(&self, writer: &mut BitWriter, ctx: &SessionContext, client_id: u32) {
        writer.write_ranged_u32(self.state.to_u32(), 0, RespawnState::COUNT);

        match self.state {
            RespawnState::Transporting => {
                writer.write_bool(self.return_countdown_started);
                writer.write_f32(ctx.settings.max_transport_time);
                writer.write_f32(
                    self.return_time
                        .saturating_duration_since(Instant::now())
                        .as_secs_f32(),
                );
            }
            RespawnState::Waiting => {
                let force_main_sub = ctx
                    .campaign
                    .as_deref()
                    .and_then(|c| c.get_character_data(client_id))
                    .map(|d| !d.has_spawned)
                    .unwrap_or(false);
                writer.write_u16(self.pending_respawn_count as u16);
                writer.write_u16(self.required_respawn_count as u16);
                writer.write_bool(self.is_respawn_prompt_pending_for(ctx, client_id));
                writer.write_bool(self.respawn_countdown_started);
                writer.write_bool(force_main_sub);
                writer.write_f32(
                    self.respawn_time
                        .saturating_duration_since(Instant::now())
                        .as_secs_f32(),
                );
            }
            RespawnState::Returning => {}
        }

        writer.write_pad_bits();
    }

    #[cfg(test)]
    fn rewind_respawn_time(&mut self, by: Duration) {
        self.respawn_time -= by;
    }

    #[cfg(test)]
    fn rewind_despawn_time(&mut self, by: Duration) {
        self.despawn_time -= by;
    }
}

/// Regresses a character's skills toward the job's default levels, applied
/// when respawning mid-round in the campaign
pub fn reduce_character_skills(info: &mut CharacterInfo) {
    let Some(job) = info.job.as_mut() else {
        return;
    };
    for skill in &mut job.skills {
        let Some(default) = job
            .prefab
            .default_skills
            .iter()
            .find(|s| s.identifier == skill.identifier)
        else {
            continue;
        };
        skill.level += (default.level - skill.level) * SKILL_REGRESSION_ON_MIDROUND_RESPAWN;
    }
}
