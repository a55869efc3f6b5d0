//! Idea store: the single mutable resource shared by all lanes.
//!
//! Every operation takes the store lock once, so a reader never observes a
//! half-applied promotion. Rounds after seeding land through
//! [`IdeaStore::commit_round`], which writes every lane's challengers, reviews,
//! promotion and round record in one go, so a poll never sees one lane
//! promoted at round r while another still shows round r-1. The store can optionally mirror itself to a JSON
//! snapshot file; `flush` rewrites the whole file through a temp file and an
//! atomic rename.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::types::*;
use crate::error::{TournamentError, TournamentResult};

/// Shared reference to IdeaStore
pub type SharedIdeaStore = Arc<IdeaStore>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    tournaments: BTreeMap<TournamentId, TournamentEntry>,
    ideas: BTreeMap<IdeaId, Idea>,
    reviews: BTreeMap<IdeaId, BTreeMap<ReviewerId, Review>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TournamentEntry {
    tournament: Tournament,
    lanes: Vec<LaneEntry>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LaneEntry {
    /// Idea ids in append order, which is round order.
    ideas: Vec<IdeaId>,
    champions: Vec<ChampionChange>,
    rounds: Vec<LaneRoundRecord>,
}

impl LaneEntry {
    fn current_champion(&self) -> Option<&IdeaId> {
        self.champions.last().map(|c| &c.idea_id)
    }

    fn champion_at(&self, round: u32) -> Option<&IdeaId> {
        self.champions
            .iter()
            .rev()
            .find(|c| c.round <= round)
            .map(|c| &c.idea_id)
    }
}

impl StoreData {
    fn entry(&self, tournament_id: &str) -> TournamentResult<&TournamentEntry> {
        self.tournaments
            .get(tournament_id)
            .ok_or_else(|| not_found_tournament(tournament_id))
    }

    fn entry_mut(&mut self, tournament_id: &str) -> TournamentResult<&mut TournamentEntry> {
        self.tournaments
            .get_mut(tournament_id)
            .ok_or_else(|| not_found_tournament(tournament_id))
    }
}

impl TournamentEntry {
    fn lane(&self, lane: u32) -> TournamentResult<&LaneEntry> {
        self.lanes.get(lane as usize).ok_or_else(|| {
            TournamentError::NotFound(format!(
                "lane {lane} of tournament {}",
                self.tournament.id
            ))
        })
    }

    fn ensure_writable(&self) -> TournamentResult<()> {
        if self.tournament.status.is_terminal() {
            return Err(TournamentError::Conflict(format!(
                "tournament {} is already {}",
                self.tournament.id, self.tournament.status
            )));
        }
        Ok(())
    }
}

fn not_found_tournament(id: &str) -> TournamentError {
    TournamentError::NotFound(format!("tournament {id}"))
}

/// Checks every new idea must pass before it is stored.
fn check_new_idea(data: &StoreData, t: &Tournament, idea: &Idea) -> TournamentResult<()> {
    if idea.is_champion {
        return Err(TournamentError::Validation(format!(
            "idea {} must be stored as a challenger; promotion sets the champion flag",
            idea.id
        )));
    }
    if data.ideas.contains_key(&idea.id) {
        return Err(TournamentError::Conflict(format!(
            "idea {} already stored",
            idea.id
        )));
    }
    if idea.tournament_id != t.id {
        return Err(TournamentError::Validation(format!(
            "idea {} belongs to tournament {}",
            idea.id, idea.tournament_id
        )));
    }
    if idea.round > t.current_round {
        return Err(TournamentError::Validation(format!(
            "idea round {} exceeds current round {}",
            idea.round, t.current_round
        )));
    }
    if idea.lane >= t.lane_count {
        return Err(TournamentError::Validation(format!(
            "lane {} out of range (laneCount {})",
            idea.lane, t.lane_count
        )));
    }
    if let Some(scores) = &idea.scores {
        if !scores.is_consistent_with(&t.settings.weights) {
            return Err(TournamentError::Validation(format!(
                "overall score of idea {} does not match the tournament weights",
                idea.id
            )));
        }
    }
    Ok(())
}

/// A champion change carried by a [`LaneCommit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Promotion {
    /// Champion the lane decided against. Compared at commit time.
    pub expected: IdeaId,
    pub champion: IdeaId,
}

/// Everything one lane produced in a round.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneCommit {
    pub record: LaneRoundRecord,
    pub challengers: Vec<Idea>,
    pub reviews: Vec<Review>,
    pub promotion: Option<Promotion>,
}

impl LaneCommit {
    /// A round that stores nothing but its record.
    pub fn record_only(record: LaneRoundRecord) -> Self {
        Self {
            record,
            challengers: Vec::new(),
            reviews: Vec::new(),
            promotion: None,
        }
    }
}

/// Per-lane view used by status polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaneSummary {
    pub lane: u32,
    pub champion_id: Option<IdeaId>,
    pub champion_score: Option<f64>,
    pub idea_count: usize,
    pub last_round: Option<u32>,
    pub last_outcome: Option<LaneOutcome>,
}

/// Consistent view of one tournament, read under a single lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentSnapshot {
    pub tournament: Tournament,
    pub ideas: Vec<Idea>,
    pub lanes: Vec<LaneSummary>,
}

/// Append-only store of tournaments, ideas and reviews.
pub struct IdeaStore {
    data: RwLock<StoreData>,
    path: Option<PathBuf>,
    flush_lock: Mutex<()>,
}

impl IdeaStore {
    /// Create a store that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            data: RwLock::new(StoreData::default()),
            path: None,
            flush_lock: Mutex::new(()),
        }
    }

    /// Open a store backed by a JSON snapshot, loading it if it exists.
    pub fn open(path: impl Into<PathBuf>) -> TournamentResult<Self> {
        let path = path.into();
        let data = if path.exists() {
            let bytes = std::fs::read(&path).map_err(|e| {
                TournamentError::Persistence(format!("read {}: {e}", path.display()))
            })?;
            let data: StoreData = serde_json::from_slice(&bytes).map_err(|e| {
                TournamentError::Persistence(format!("parse {}: {e}", path.display()))
            })?;
            info!(
                path = %path.display(),
                tournaments = data.tournaments.len(),
                ideas = data.ideas.len(),
                "Loaded idea store snapshot"
            );
            data
        } else {
            debug!(path = %path.display(), "No snapshot found, starting empty");
            StoreData::default()
        };

        Ok(Self {
            data: RwLock::new(data),
            path: Some(path),
            flush_lock: Mutex::new(()),
        })
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedIdeaStore {
        Arc::new(self)
    }

    /// Snapshot file path, if persistent
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn read(&self) -> TournamentResult<RwLockReadGuard<'_, StoreData>> {
        self.data.read().map_err(|_| TournamentError::LockPoisoned)
    }

    fn write(&self) -> TournamentResult<RwLockWriteGuard<'_, StoreData>> {
        self.data.write().map_err(|_| TournamentError::LockPoisoned)
    }

    /// Write the full store to the snapshot file. No-op for in-memory stores.
    pub fn flush(&self) -> TournamentResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _guard = self
            .flush_lock
            .lock()
            .map_err(|_| TournamentError::LockPoisoned)?;

        let json = {
            let data = self.read()?;
            serde_json::to_string_pretty(&*data)
                .map_err(|e| TournamentError::Persistence(format!("serialize store: {e}")))?
        };

        let persist_err =
            |e: std::io::Error| TournamentError::Persistence(format!("{}: {e}", path.display()));
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(persist_err)?;
        }
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, json).map_err(persist_err)?;
        std::fs::rename(&temp_path, path).map_err(persist_err)?;
        debug!(path = %path.display(), "Idea store flushed");
        Ok(())
    }

    // ── Tournament records ────────────────────────────────────────────────

    /// Store a new tournament and allocate its lanes.
    pub fn create_tournament(&self, tournament: Tournament) -> TournamentResult<()> {
        let mut data = self.write()?;
        if data.tournaments.contains_key(&tournament.id) {
            return Err(TournamentError::Conflict(format!(
                "tournament {} already exists",
                tournament.id
            )));
        }
        let lanes = (0..tournament.lane_count)
            .map(|_| LaneEntry::default())
            .collect();
        data.tournaments
            .insert(tournament.id.clone(), TournamentEntry { tournament, lanes });
        Ok(())
    }

    pub fn tournament(&self, tournament_id: &str) -> TournamentResult<Tournament> {
        let data = self.read()?;
        Ok(data.entry(tournament_id)?.tournament.clone())
    }

    pub fn list_tournaments(&self) -> TournamentResult<Vec<Tournament>> {
        let data = self.read()?;
        Ok(data
            .tournaments
            .values()
            .map(|e| e.tournament.clone())
            .collect())
    }

    /// Advance `currentRound` to `round`, which must be exactly the next one.
    pub fn begin_round(&self, tournament_id: &str, round: u32) -> TournamentResult<Tournament> {
        let mut data = self.write()?;
        let entry = data.entry_mut(tournament_id)?;
        entry.ensure_writable()?;
        let t = &mut entry.tournament;
        if t.status != TournamentStatus::Running {
            return Err(TournamentError::Validation(format!(
                "tournament {} is {}, not running",
                t.id, t.status
            )));
        }
        if round != t.current_round + 1 {
            return Err(TournamentError::Validation(format!(
                "cannot begin round {round}: current round is {}",
                t.current_round
            )));
        }
        if round > t.max_rounds {
            return Err(TournamentError::Validation(format!(
                "round {round} exceeds maxRounds {}",
                t.max_rounds
            )));
        }
        t.current_round = round;
        t.updated_at = Utc::now();
        Ok(t.clone())
    }

    /// Move the tournament to `status`. Terminal states are immutable.
    pub fn set_status(
        &self,
        tournament_id: &str,
        status: TournamentStatus,
        failure_reason: Option<String>,
    ) -> TournamentResult<Tournament> {
        let mut data = self.write()?;
        let entry = data.entry_mut(tournament_id)?;
        entry.ensure_writable()?;
        let t = &mut entry.tournament;
        if !t.status.can_transition_to(status) {
            return Err(TournamentError::Validation(format!(
                "tournament {} cannot move from {} to {status}",
                t.id, t.status
            )));
        }
        t.status = status;
        t.failure_reason = failure_reason;
        t.updated_at = Utc::now();
        Ok(t.clone())
    }

    /// Mark every non-terminal tournament as failed. Returns their ids.
    pub fn fail_unfinished(&self, reason: &str) -> TournamentResult<Vec<TournamentId>> {
        let mut data = self.write()?;
        let mut failed = Vec::new();
        for entry in data.tournaments.values_mut() {
            let t = &mut entry.tournament;
            if !t.status.is_terminal() {
                warn!(tournament_id = %t.id, status = %t.status, reason, "Failing unfinished tournament");
                t.status = TournamentStatus::Failed;
                t.failure_reason = Some(reason.to_string());
                t.updated_at = Utc::now();
                failed.push(t.id.clone());
            }
        }
        Ok(failed)
    }

    // ── Ideas ─────────────────────────────────────────────────────────────

    /// Store an immutable idea and return its id.
    ///
    /// Rejects ideas that arrive flagged as champion, that point at a lane
    /// outside the tournament, whose round exceeds `currentRound` or is
    /// older than the lane's latest idea, and whose scores do not match the
    /// tournament's weights.
    pub fn append(&self, idea: Idea) -> TournamentResult<IdeaId> {
        let mut guard = self.write()?;
        let data = &mut *guard;

        {
            let entry = data.entry(&idea.tournament_id)?;
            entry.ensure_writable()?;
            check_new_idea(data, &entry.tournament, &idea)?;
        }

        let entry = data
            .tournaments
            .get_mut(&idea.tournament_id)
            .ok_or_else(|| not_found_tournament(&idea.tournament_id))?;
        let lane = entry.lanes.get_mut(idea.lane as usize).ok_or_else(|| {
            TournamentError::Validation(format!("lane {} out of range", idea.lane))
        })?;
        let last_round = lane
            .ideas
            .last()
            .and_then(|id| data.ideas.get(id))
            .map(|i| i.round);
        if let Some(last_round) = last_round {
            if idea.round < last_round {
                return Err(TournamentError::Validation(format!(
                    "idea round {} precedes lane {} round {last_round}",
                    idea.round, idea.lane
                )));
            }
        }

        let id = idea.id.clone();
        lane.ideas.push(id.clone());
        debug!(
            tournament_id = %idea.tournament_id,
            lane = idea.lane,
            round = idea.round,
            idea_id = %id,
            "Idea appended"
        );
        data.ideas.insert(id.clone(), idea);
        Ok(id)
    }

    /// Make `idea_id` the lane's champion if the current champion is still
    /// `expected` (compare-and-swap). Returns the new champion.
    pub fn promote(
        &self,
        tournament_id: &str,
        lane: u32,
        expected: Option<&str>,
        idea_id: &str,
    ) -> TournamentResult<Idea> {
        let mut guard = self.write()?;
        let data = &mut *guard;

        let entry = data
            .tournaments
            .get_mut(tournament_id)
            .ok_or_else(|| not_found_tournament(tournament_id))?;
        entry.ensure_writable()?;
        let lane_entry = entry.lanes.get_mut(lane as usize).ok_or_else(|| {
            TournamentError::NotFound(format!("lane {lane} of tournament {tournament_id}"))
        })?;

        let candidate = data
            .ideas
            .get(idea_id)
            .ok_or_else(|| TournamentError::NotFound(format!("idea {idea_id}")))?;
        if candidate.tournament_id != tournament_id || candidate.lane != lane {
            return Err(TournamentError::Validation(format!(
                "idea {idea_id} belongs to lane {} of tournament {}",
                candidate.lane, candidate.tournament_id
            )));
        }
        if candidate.scores.is_none() {
            return Err(TournamentError::Validation(format!(
                "idea {idea_id} is unscored and cannot be champion"
            )));
        }

        let current = lane_entry.current_champion().cloned();
        if current.as_deref() != expected {
            return Err(TournamentError::Conflict(format!(
                "lane {lane} champion is {}, expected {}",
                current.as_deref().unwrap_or("none"),
                expected.unwrap_or("none")
            )));
        }
        if current.as_deref() == Some(idea_id) {
            return Err(TournamentError::Validation(format!(
                "idea {idea_id} is already champion of lane {lane}"
            )));
        }

        let round = candidate.round;
        if let Some(old) = current.and_then(|id| data.ideas.get_mut(&id)) {
            old.is_champion = false;
        }
        let promoted = match data.ideas.get_mut(idea_id) {
            Some(idea) => {
                idea.is_champion = true;
                idea.clone()
            }
            None => return Err(TournamentError::NotFound(format!("idea {idea_id}"))),
        };
        lane_entry.champions.push(ChampionChange {
            round,
            idea_id: idea_id.to_string(),
        });
        Ok(promoted)
    }

    /// Apply round `round` for every lane in `commits` under one write lock.
    ///
    /// All or nothing: every commit is validated before the first write. A
    /// promotion whose expected champion is no longer current fails the whole
    /// call with `Conflict`, naming each lane that moved.
    pub fn commit_round(
        &self,
        tournament_id: &str,
        round: u32,
        commits: Vec<LaneCommit>,
    ) -> TournamentResult<()> {
        let mut guard = self.write()?;
        let data = &mut *guard;

        {
            let entry = data.entry(tournament_id)?;
            entry.ensure_writable()?;
            let t = &entry.tournament;
            if t.current_round != round {
                return Err(TournamentError::Validation(format!(
                    "cannot commit round {round}: current round is {}",
                    t.current_round
                )));
            }

            let mut lanes = BTreeSet::new();
            let mut conflicts = Vec::new();
            for commit in &commits {
                let lane = commit.record.lane;
                if commit.record.round != round {
                    return Err(TournamentError::Validation(format!(
                        "lane {lane} record is for round {}, not {round}",
                        commit.record.round
                    )));
                }
                if !lanes.insert(lane) {
                    return Err(TournamentError::Validation(format!(
                        "lane {lane} committed twice in round {round}"
                    )));
                }
                let lane_entry = entry.lane(lane)?;
                for idea in &commit.challengers {
                    check_new_idea(data, t, idea)?;
                    if idea.lane != lane || idea.round != round {
                        return Err(TournamentError::Validation(format!(
                            "idea {} is lane {} round {}, committed as lane {lane} round {round}",
                            idea.id, idea.lane, idea.round
                        )));
                    }
                }
                if let Some(review) = commit
                    .reviews
                    .iter()
                    .find(|r| !commit.challengers.iter().any(|i| i.id == r.idea_id))
                {
                    return Err(TournamentError::NotFound(format!(
                        "idea {} reviewed by {} in lane {lane}",
                        review.idea_id, review.reviewer_id
                    )));
                }
                if let Some(promotion) = &commit.promotion {
                    let target = commit
                        .challengers
                        .iter()
                        .find(|i| i.id == promotion.champion)
                        .ok_or_else(|| {
                            TournamentError::Validation(format!(
                                "idea {} is not a round {round} challenger of lane {lane}",
                                promotion.champion
                            ))
                        })?;
                    if target.scores.is_none() {
                        return Err(TournamentError::Validation(format!(
                            "idea {} is unscored and cannot be champion",
                            target.id
                        )));
                    }
                    let current = lane_entry.current_champion();
                    if current != Some(&promotion.expected) {
                        conflicts.push(format!(
                            "lane {lane} champion is {}, expected {}",
                            current.map(String::as_str).unwrap_or("none"),
                            promotion.expected
                        ));
                    }
                }
            }
            if !conflicts.is_empty() {
                return Err(TournamentError::Conflict(conflicts.join("; ")));
            }
        }

        let StoreData {
            tournaments,
            ideas,
            reviews,
        } = data;
        let entry = tournaments
            .get_mut(tournament_id)
            .ok_or_else(|| not_found_tournament(tournament_id))?;
        let committed = commits.len();
        for commit in commits {
            let LaneCommit {
                record,
                challengers,
                reviews: lane_reviews,
                promotion,
            } = commit;
            let lane = record.lane;
            let lane_entry = entry.lanes.get_mut(lane as usize).ok_or_else(|| {
                TournamentError::Validation(format!("lane {lane} out of range"))
            })?;
            for idea in challengers {
                lane_entry.ideas.push(idea.id.clone());
                ideas.insert(idea.id.clone(), idea);
            }
            for review in lane_reviews {
                reviews
                    .entry(review.idea_id.clone())
                    .or_default()
                    .insert(review.reviewer_id.clone(), review);
            }
            if let Some(Promotion { expected, champion }) = promotion {
                if let Some(old) = ideas.get_mut(&expected) {
                    old.is_champion = false;
                }
                if let Some(new) = ideas.get_mut(&champion) {
                    new.is_champion = true;
                }
                lane_entry.champions.push(ChampionChange {
                    round,
                    idea_id: champion,
                });
            }
            lane_entry.rounds.push(record);
        }
        entry.tournament.updated_at = Utc::now();
        debug!(tournament_id, round, lanes = committed, "Round committed");
        Ok(())
    }

    /// The lane's current champion. `NotFound` before the lane is seeded.
    pub fn current_champion(&self, tournament_id: &str, lane: u32) -> TournamentResult<Idea> {
        let data = self.read()?;
        let lane_entry = data.entry(tournament_id)?.lane(lane)?;
        lane_entry
            .current_champion()
            .and_then(|id| data.ideas.get(id))
            .cloned()
            .ok_or_else(|| {
                TournamentError::NotFound(format!(
                    "champion of lane {lane} in tournament {tournament_id}"
                ))
            })
    }

    /// Ideas of one lane with `round <= through_round`, in round order, with
    /// `is_champion` projected as of `through_round`.
    pub fn list_by_lane(
        &self,
        tournament_id: &str,
        lane: u32,
        through_round: u32,
    ) -> TournamentResult<Vec<Idea>> {
        let data = self.read()?;
        let lane_entry = data.entry(tournament_id)?.lane(lane)?;
        let champion = lane_entry.champion_at(through_round);
        Ok(lane_entry
            .ideas
            .iter()
            .filter_map(|id| data.ideas.get(id))
            .filter(|idea| idea.round <= through_round)
            .map(|idea| {
                let mut idea = idea.clone();
                idea.is_champion = champion == Some(&idea.id);
                idea
            })
            .collect())
    }

    /// Id of the lane's champion as of `round`.
    pub fn champion_at(
        &self,
        tournament_id: &str,
        lane: u32,
        round: u32,
    ) -> TournamentResult<Option<IdeaId>> {
        let data = self.read()?;
        let lane_entry = data.entry(tournament_id)?.lane(lane)?;
        Ok(lane_entry.champion_at(round).cloned())
    }

    pub fn idea(&self, idea_id: &str) -> TournamentResult<Idea> {
        let data = self.read()?;
        data.ideas
            .get(idea_id)
            .cloned()
            .ok_or_else(|| TournamentError::NotFound(format!("idea {idea_id}")))
    }

    /// Full history of a tournament: lane by lane, in round order.
    pub fn ideas(&self, tournament_id: &str) -> TournamentResult<Vec<Idea>> {
        let data = self.read()?;
        let entry = data.entry(tournament_id)?;
        Ok(collect_ideas(&data, entry))
    }

    // ── Lane round records ────────────────────────────────────────────────

    pub fn record_lane_round(
        &self,
        tournament_id: &str,
        record: LaneRoundRecord,
    ) -> TournamentResult<()> {
        let mut data = self.write()?;
        let entry = data.entry_mut(tournament_id)?;
        entry.ensure_writable()?;
        if record.round > entry.tournament.current_round {
            return Err(TournamentError::Validation(format!(
                "lane record round {} exceeds current round {}",
                record.round, entry.tournament.current_round
            )));
        }
        let lane = record.lane;
        let lane_entry = entry.lanes.get_mut(lane as usize).ok_or_else(|| {
            TournamentError::Validation(format!("lane {lane} out of range"))
        })?;
        lane_entry.rounds.push(record);
        Ok(())
    }

    pub fn lane_rounds(
        &self,
        tournament_id: &str,
        lane: u32,
    ) -> TournamentResult<Vec<LaneRoundRecord>> {
        let data = self.read()?;
        Ok(data.entry(tournament_id)?.lane(lane)?.rounds.clone())
    }

    // ── Reviews ───────────────────────────────────────────────────────────

    /// Retain a review for display. The idea must already be stored.
    pub fn put_review(&self, review: Review) -> TournamentResult<()> {
        let mut data = self.write()?;
        if !data.ideas.contains_key(&review.idea_id) {
            return Err(TournamentError::NotFound(format!(
                "idea {}",
                review.idea_id
            )));
        }
        data.reviews
            .entry(review.idea_id.clone())
            .or_default()
            .insert(review.reviewer_id.clone(), review);
        Ok(())
    }

    pub fn review(&self, idea_id: &str, reviewer_id: &str) -> TournamentResult<Review> {
        let data = self.read()?;
        data.reviews
            .get(idea_id)
            .and_then(|by_reviewer| by_reviewer.get(reviewer_id))
            .cloned()
            .ok_or_else(|| {
                TournamentError::NotFound(format!(
                    "review of idea {idea_id} by reviewer {reviewer_id}"
                ))
            })
    }

    pub fn reviews_for(&self, idea_id: &str) -> TournamentResult<Vec<Review>> {
        let data = self.read()?;
        Ok(data
            .reviews
            .get(idea_id)
            .map(|by_reviewer| by_reviewer.values().cloned().collect())
            .unwrap_or_default())
    }

    // ── Snapshots ─────────────────────────────────────────────────────────

    /// Tournament record, ideas and lane summaries read under one lock.
    pub fn snapshot(&self, tournament_id: &str) -> TournamentResult<TournamentSnapshot> {
        let data = self.read()?;
        let entry = data.entry(tournament_id)?;
        let lanes = entry
            .lanes
            .iter()
            .enumerate()
            .map(|(index, lane)| {
                let champion = lane.current_champion().and_then(|id| data.ideas.get(id));
                let last = lane.rounds.last();
                LaneSummary {
                    lane: index as u32,
                    champion_id: champion.map(|i| i.id.clone()),
                    champion_score: champion.and_then(Idea::overall_score),
                    idea_count: lane.ideas.len(),
                    last_round: last.map(|r| r.round),
                    last_outcome: last.map(|r| r.outcome),
                }
            })
            .collect();
        Ok(TournamentSnapshot {
            tournament: entry.tournament.clone(),
            ideas: collect_ideas(&data, entry),
            lanes,
        })
    }
}

fn collect_ideas(data: &StoreData, entry: &TournamentEntry) -> Vec<Idea> {
    entry
        .lanes
        .iter()
        .flat_map(|lane| lane.ideas.iter())
        .filter_map(|id| data.ideas.get(id))
        .cloned()
        .collect()
}
