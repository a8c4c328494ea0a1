use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::error::{BookingError, BookingResult, ConflictReason};
use crate::models::{NewRoom, Room};
use crate::store::{CinemaStore, StoreError};

const ROOM_NAME_INDEX: &str = "rooms_active_name_key";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RoomRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(range(min = 1))]
    pub rows: i32,
    #[validate(range(min = 1))]
    pub columns: i32,
}

#[derive(Clone)]
pub struct RoomService {
    store: Arc<dyn CinemaStore>,
}

impl RoomService {
    pub fn new(store: Arc<dyn CinemaStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> BookingResult<Vec<Room>> {
        self.store.list_rooms().await.map_err(BookingError::from_store("Failed to list rooms"))
    }

    pub async fn get(&self, id: i64) -> BookingResult<Room> {
        self.store
            .find_room(id)
            .await
            .map_err(BookingError::from_store("Failed to load room"))?
            .ok_or(BookingError::NotFound("Room"))
    }

    pub async fn create(&self, request: RoomRequest) -> BookingResult<Room> {
        request.validate()?;
        self.ensure_name_free(&request.name, None).await?;

        let room = self
            .store
            .insert_room(NewRoom {
                name: request.name,
                rows: request.rows,
                columns: request.columns,
                created_at: Utc::now(),
            })
            .await
            .map_err(duplicate_or("Failed to create room"))?;

        info!(room_id = room.id, name = %room.name, "room created");
        Ok(room)
    }

    /// Keeps the creation time; the name must stay unique among other active rooms.
    pub async fn update(&self, id: i64, request: RoomRequest) -> BookingResult<Room> {
        request.validate()?;
        let existing = self.get(id).await?;
        self.ensure_name_free(&request.name, Some(id)).await?;

        let room = Room { name: request.name, rows: request.rows, columns: request.columns, ..existing };
        let found = self.store.update_room(&room).await.map_err(duplicate_or("Failed to update room"))?;
        if !found {
            return Err(BookingError::NotFound("Room"));
        }
        info!(room_id = id, "room updated");
        Ok(room)
    }

    pub async fn delete(&self, id: i64) -> BookingResult<()> {
        let deleted = self
            .store
            .soft_delete_room(id, Utc::now())
            .await
            .map_err(BookingError::from_store("Failed to delete room"))?;
        if !deleted {
            return Err(BookingError::NotFound("Room"));
        }
        info!(room_id = id, "room deleted");
        Ok(())
    }

    async fn ensure_name_free(&self, name: &str, exclude_id: Option<i64>) -> BookingResult<()> {
        let taken = self
            .store
            .room_name_taken(name, exclude_id)
            .await
            .map_err(BookingError::from_store("Failed to check room name"))?;
        if taken {
            return Err(ConflictReason::DuplicateName { entity: "Room" }.into());
        }
        Ok(())
    }
}

// Two concurrent creates can both pass the lookup; the index catches the second.
fn duplicate_or(context: &'static str) -> impl FnOnce(StoreError) -> BookingError {
    move |e| {
        if e.is_unique_violation_of(ROOM_NAME_INDEX) {
            ConflictReason::DuplicateName { entity: "Room" }.into()
        } else {
            BookingError::from_store(context)(e)
        }
    }
}
