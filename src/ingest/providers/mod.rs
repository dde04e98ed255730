pub mod nyt_events;
