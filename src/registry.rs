//! The room registry: code generation, lookup/creation, and removal.

use std::collections::HashMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rand::Rng;
use thiserror::Error;

use crate::room::{Room, RoomCode, ALPHABET, CODE_LEN};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no unused room code found after the configured number of attempts")]
    ResourceExhausted,
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.to_string(),
            "code": "RESOURCE_EXHAUSTED",
        });
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}

/// Holds every live room, keyed by code.
pub struct RoomRegistry {
    rooms: HashMap<RoomCode, Room>,
    max_rooms: Option<usize>,
    code_gen_max_attempts: usize,
}

impl RoomRegistry {
    pub fn new(max_rooms: Option<usize>, code_gen_max_attempts: usize) -> Self {
        Self {
            rooms: HashMap::new(),
            max_rooms,
            code_gen_max_attempts,
        }
    }

    pub fn lookup(&self, code: &RoomCode) -> Option<&Room> {
        self.rooms.get(code)
    }

    pub fn lookup_mut(&mut self, code: &RoomCode) -> Option<&mut Room> {
        self.rooms.get_mut(code)
    }

    /// Look up a room by code, creating an empty one if absent. Unlike
    /// [`RoomRegistry::generate`], this never enforces `max_rooms`: a
    /// joiner supplying an existing code must always be able to reach the
    /// room that code names.
    pub fn get_or_create_mut(&mut self, code: RoomCode) -> &mut Room {
        self.rooms
            .entry(code.clone())
            .or_insert_with(|| Room::new(code))
    }

    pub fn remove(&mut self, code: &RoomCode) -> Option<Room> {
        self.rooms.remove(code)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Generate a fresh, currently-unused room code and register an empty
    /// room under it. Retries collisions up to `code_gen_max_attempts`
    /// times before giving up.
    pub fn generate(&mut self, rng: &mut impl Rng) -> Result<RoomCode, RegistryError> {
        if let Some(cap) = self.max_rooms {
            if self.rooms.len() >= cap {
                return Err(RegistryError::ResourceExhausted);
            }
        }
        for _ in 0..self.code_gen_max_attempts {
            let code = random_code(rng);
            if !self.rooms.contains_key(&code) {
                self.rooms.insert(code.clone(), Room::new(code.clone()));
                return Ok(code);
            }
        }
        Err(RegistryError::ResourceExhausted)
    }
}

fn random_code(rng: &mut impl Rng) -> RoomCode {
    let s: String = (0..CODE_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..ALPHABET.len());
            ALPHABET[idx] as char
        })
        .collect();
    RoomCode::new(&s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn generated_codes_match_alphabet_and_length() {
        let mut registry = RoomRegistry::new(None, 8);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let code = registry.generate(&mut rng).unwrap();
            assert_eq!(code.as_str().len(), CODE_LEN);
            assert!(code.as_str().bytes().all(|b| ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn generated_codes_are_unique() {
        let mut registry = RoomRegistry::new(None, 8);
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            let code = registry.generate(&mut rng).unwrap();
            assert!(seen.insert(code));
        }
    }

    #[test]
    fn generate_respects_max_rooms_cap() {
        let mut registry = RoomRegistry::new(Some(1), 8);
        let mut rng = StdRng::seed_from_u64(1);
        registry.generate(&mut rng).unwrap();
        assert!(matches!(
            registry.generate(&mut rng),
            Err(RegistryError::ResourceExhausted)
        ));
    }

    #[test]
    fn get_or_create_ignores_max_rooms_cap() {
        let mut registry = RoomRegistry::new(Some(0), 8);
        let room = registry.get_or_create_mut(RoomCode::new("ABCDEF"));
        assert!(room.is_empty());
        assert_eq!(registry.room_count(), 1);
    }

    #[test]
    fn get_or_create_is_idempotent_for_same_code() {
        let mut registry = RoomRegistry::new(None, 8);
        let code = RoomCode::new("ABCDEF");
        registry.get_or_create_mut(code.clone());
        registry.get_or_create_mut(code.clone());
        assert_eq!(registry.room_count(), 1);
    }
}
