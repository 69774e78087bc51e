use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::stylist::session::SessionBusy;
use crate::stylist::{ItemType, OutfitImages, SessionStore, Stylist};

/// Photos received for a chat but not yet used by `/generate`.
#[derive(Debug, Clone, Default)]
pub struct StagedOutfit {
    pub top: Option<PathBuf>,
    pub bottom: Option<PathBuf>,
    pub shoes: Option<PathBuf>,
    pub jacket: Option<PathBuf>,
}

impl StagedOutfit {
    pub fn set(&mut self, item_type: ItemType, path: PathBuf) {
        let slot = match item_type {
            ItemType::Top => &mut self.top,
            ItemType::Bottom => &mut self.bottom,
            ItemType::Shoes => &mut self.shoes,
            ItemType::Jacket => &mut self.jacket,
        };
        *slot = Some(path);
    }

    pub fn get(&self, item_type: ItemType) -> Option<&PathBuf> {
        match item_type {
            ItemType::Top => self.top.as_ref(),
            ItemType::Bottom => self.bottom.as_ref(),
            ItemType::Shoes => self.shoes.as_ref(),
            ItemType::Jacket => self.jacket.as_ref(),
        }
    }

    pub fn missing_required(&self) -> Vec<ItemType> {
        [ItemType::Top, ItemType::Bottom, ItemType::Shoes]
            .into_iter()
            .filter(|item| self.get(*item).is_none())
            .collect()
    }

    pub fn to_images(&self) -> Option<OutfitImages> {
        Some(OutfitImages {
            top: self.top.clone()?,
            bottom: self.bottom.clone()?,
            shoes: self.shoes.clone()?,
            jacket: self.jacket.clone(),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub stylist: Stylist,
    pub sessions: SessionStore,
    pub staged_outfits: Arc<Mutex<HashMap<i64, StagedOutfit>>>,
}

impl AppState {
    pub fn new(config: Arc<Config>, stylist: Stylist) -> Self {
        AppState {
            config,
            stylist,
            sessions: SessionStore::new(),
            staged_outfits: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn stage(&self, chat_id: i64, item_type: ItemType, path: PathBuf) -> StagedOutfit {
        let mut staged = self.staged_outfits.lock();
        let entry = staged.entry(chat_id).or_default();
        entry.set(item_type, path);
        entry.clone()
    }

    pub fn staged(&self, chat_id: i64) -> StagedOutfit {
        self.staged_outfits
            .lock()
            .get(&chat_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn clear_staged(&self, chat_id: i64) {
        self.staged_outfits.lock().remove(&chat_id);
    }

    /// Forgets staged photos and the session. The session stays locked until
    /// it is out of the store, so no command can start on the old entry.
    pub fn reset_chat(&self, chat_id: i64) -> Result<(), SessionBusy> {
        let _guard = self.sessions.try_acquire(chat_id)?;
        self.clear_staged(chat_id);
        self.sessions.remove(chat_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::llm::{OpenAiClient, ReplicateClient};

    fn app_state() -> AppState {
        let config = Config::from_lookup(|name| match name {
            "OPENAI_API_KEY" => Some("sk-test".to_string()),
            "REPLICATE_API_TOKEN" => Some("r8-test".to_string()),
            _ => None,
        })
        .unwrap();
        let stylist = Stylist::from_config(
            &config,
            Arc::new(OpenAiClient::new("http://127.0.0.1:9", "sk-test", Duration::from_secs(1))),
            Arc::new(ReplicateClient::new("http://127.0.0.1:9", "r8-test", "owner/model")),
        );
        AppState::new(Arc::new(config), stylist)
    }

    #[test]
    fn reset_is_refused_while_a_command_holds_the_session() {
        let state = app_state();
        state.stage(5, ItemType::Top, PathBuf::from("top.jpg"));
        let mut running = state.sessions.try_acquire(5).unwrap();
        running.suggestions.push("a belt".to_string());

        assert!(state.reset_chat(5).is_err());
        assert!(state.staged(5).top.is_some());

        drop(running);
        assert!(state.reset_chat(5).is_ok());
        assert!(state.staged(5).top.is_none());
        assert!(state.sessions.try_acquire(5).unwrap().suggestions.is_empty());
    }

    #[test]
    fn staged_outfit_requires_top_bottom_and_shoes() {
        let mut staged = StagedOutfit::default();
        staged.set(ItemType::Top, PathBuf::from("top.jpg"));
        staged.set(ItemType::Jacket, PathBuf::from("jacket.jpg"));
        assert_eq!(
            staged.missing_required(),
            vec![ItemType::Bottom, ItemType::Shoes]
        );
        assert!(staged.to_images().is_none());

        staged.set(ItemType::Bottom, PathBuf::from("bottom.jpg"));
        staged.set(ItemType::Shoes, PathBuf::from("shoes.jpg"));
        let images = staged.to_images().unwrap();
        assert_eq!(images.jacket, Some(PathBuf::from("jacket.jpg")));
    }
}
