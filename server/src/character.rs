//! Characters, jobs and persistent campaign character records

use log::info;
use std::collections::HashMap;

use crate::world::{SpawnPoint, Vec2};

pub type CharacterId = u32;

/// Teams characters fight on. Respawning is only supported for the crew team.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamId {
    Team1,
    Team2,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Skill {
    pub identifier: String,
    pub level: f32,
}

impl Skill {
    pub fn new(identifier: &str, level: f32) -> Self {
        Self {
            identifier: identifier.to_string(),
            level,
        }
    }
}

/// Static job definition: starting skill levels and default loadout
#[derive(Debug, Clone, PartialEq)]
pub struct JobPrefab {
    pub identifier: String,
    pub name: String,
    pub default_skills: Vec<Skill>,
    pub default_items: Vec<String>,
}

impl JobPrefab {
    pub fn new(identifier: &str, name: &str, default_skills: Vec<Skill>) -> Self {
        Self {
            identifier: identifier.to_string(),
            name: name.to_string(),
            default_skills,
            default_items: vec!["idcard".to_string()],
        }
    }
}

/// A character's current occupation, with skills that drift away from the
/// prefab defaults over a campaign
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub prefab: JobPrefab,
    pub skills: Vec<Skill>,
}

impl Job {
    pub fn from_prefab(prefab: JobPrefab) -> Self {
        let skills = prefab.default_skills.clone();
        Self { prefab, skills }
    }
}

/// Everything that survives a character's body: identity, job, skill levels,
/// and the death bookkeeping cleared on respawn
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterInfo {
    pub name: String,
    pub job: Option<Job>,
    pub cause_of_death: Option<String>,
    /// Temporary stat bonuses that do not survive death
    pub saved_stat_values: Vec<(String, f32)>,
    pub current_orders: Vec<String>,
}

impl CharacterInfo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            job: None,
            cause_of_death: None,
            saved_stat_values: Vec::new(),
            current_orders: Vec::new(),
        }
    }

    pub fn clear_current_orders(&mut self) {
        self.current_orders.clear();
    }
}

/// An item carried by a character. Only identity, tags and description are
/// tracked; full item simulation is out of scope here.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryItem {
    pub identifier: String,
    pub tags: Vec<String>,
    pub description: String,
}

impl InventoryItem {
    pub fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            tags: Vec::new(),
            description: String::new(),
        }
    }

    pub fn add_tag(&mut self, tag: &str) {
        if !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
        }
    }
}

/// A live character body in the simulation
#[derive(Debug, Clone)]
pub struct Character {
    pub id: CharacterId,
    pub info: CharacterInfo,
    pub team: TeamId,
    pub is_dead: bool,
    /// Bot bodies are driven by AI rather than a remote player
    pub is_bot: bool,
    pub aboard_shuttle: bool,
    pub position: Vec2,
    pub vitality: f32,
    pub owner_client: Option<u32>,
    pub inventory: Vec<InventoryItem>,
}

impl Character {
    /// Grants the job's default loadout plus the ID card tags of the given berth
    pub fn give_job_items(&mut self, spawn_point: &SpawnPoint) {
        let identifiers: Vec<String> = match &self.info.job {
            Some(job) => job.prefab.default_items.clone(),
            None => vec!["idcard".to_string()],
        };
        for identifier in identifiers {
            self.inventory.push(InventoryItem::new(&identifier));
        }
        self.give_id_card_tags(spawn_point);
    }

    /// Copies a spawn point's access tags and description onto carried ID cards
    pub fn give_id_card_tags(&mut self, spawn_point: &SpawnPoint) {
        for item in &mut self.inventory {
            if item.identifier != "idcard" {
                continue;
            }
            for tag in &spawn_point.id_card_tags {
                item.add_tag(tag);
            }
            if !spawn_point.id_card_description.trim().is_empty() {
                item.description = spawn_point.id_card_description.clone();
            }
        }
    }
}

/// All live characters in the session, bots and players alike
#[derive(Debug, Default)]
pub struct CharacterRoster {
    characters: Vec<Character>,
    next_id: CharacterId,
}

impl CharacterRoster {
    pub fn new() -> Self {
        Self {
            characters: Vec::new(),
            next_id: 1,
        }
    }

    pub fn spawn(
        &mut self,
        info: CharacterInfo,
        position: Vec2,
        team: TeamId,
        is_bot: bool,
        aboard_shuttle: bool,
    ) -> CharacterId {
        let id = self.next_id;
        self.next_id += 1;
        self.characters.push(Character {
            id,
            info,
            team,
            is_dead: false,
            is_bot,
            aboard_shuttle,
            position,
            vitality: 100.0,
            owner_client: None,
            inventory: Vec::new(),
        });
        id
    }

    /// Removes a character immediately, without the usual corpse lifetime
    pub fn despawn_now(&mut self, id: CharacterId) {
        if let Some(index) = self.characters.iter().position(|c| c.id == id) {
            let removed = self.characters.swap_remove(index);
            info!("Despawned character {} ({})", removed.info.name, removed.id);
        }
    }

    pub fn get(&self, id: CharacterId) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: CharacterId) -> Option<&mut Character> {
        self.characters.iter_mut().find(|c| c.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Character> {
        self.characters.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Character> {
        self.characters.iter_mut()
    }

    pub fn any_alive_aboard_shuttle(&self) -> bool {
        self.characters.iter().any(|c| c.aboard_shuttle && !c.is_dead)
    }

    /// True if a living body exists for the given character info
    pub fn any_alive_with_info(&self, info: &CharacterInfo) -> bool {
        self.characters
            .iter()
            .any(|c| &c.info == info && !c.is_dead)
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }
}

/// Per-client state persisted by the campaign across rounds
#[derive(Debug, Clone)]
pub struct CampaignCharacterData {
    pub info: CharacterInfo,
    pub has_spawned: bool,
    pub item_data: Option<Vec<InventoryItem>>,
    pub health_data: Option<f32>,
}

impl CampaignCharacterData {
    pub fn has_item_data(&self) -> bool {
        self.item_data.is_some()
    }

    /// Restores the persisted inventory onto a freshly spawned body
    pub fn spawn_inventory_items(&self, character: &mut Character) {
        if let Some(items) = &self.item_data {
            character.inventory = items.clone();
        }
    }

    pub fn apply_health_data(&self, character: &mut Character) {
        if let Some(vitality) = self.health_data {
            character.vitality = vitality;
        }
    }
}

/// Campaign mode handle: persistent character records keyed by client id
#[derive(Debug, Default)]
pub struct Campaign {
    data: HashMap<u32, CampaignCharacterData>,
}

impl Campaign {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_character_data(&self, client_id: u32) -> Option<&CampaignCharacterData> {
        self.data.get(&client_id)
    }

    pub fn get_character_data_mut(
        &mut self,
        client_id: u32,
    ) -> Option<&mut CampaignCharacterData> {
        self.data.get_mut(&client_id)
    }

    /// Overwrites (or creates) the client's record from their current info
    pub fn set_character_data(
        &mut self,
        client_id: u32,
        info: CharacterInfo,
    ) -> &mut CampaignCharacterData {
        self.data
            .entry(client_id)
            .and_modify(|d| d.info = info.clone())
            .or_insert_with(|| CampaignCharacterData {
                info,
                has_spawned: false,
                item_data: None,
                health_data: None,
            })
    }
}
