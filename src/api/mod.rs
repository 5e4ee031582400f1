pub mod elevenlabs;
pub mod google_tts;
pub mod pexels;
