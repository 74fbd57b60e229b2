//! Collaborator services: script writing, narration and stock clips.

pub mod elevenlabs;
pub mod openai;
pub mod pexels;
