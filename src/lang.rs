//! Best-effort Polish/English detection used to steer the prompt
//!
//! Not a real language detector; a handful of diacritic and
//! common-word patterns is enough to tell the model which language
//! to answer in.

use std::sync::LazyLock;

use regex::Regex;

static POLISH_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\b(że|jest|się|jak|w|na|co|to|nie|do|z|a|o|przez|po|jeśli|czy|",
        r"możesz|może|jesteś|mam|mi|ci|dziękuję|proszę|pomóż|daj|pokaż|",
        r"powiedz|wyjaśnij|opowiedz|mów|pisz|czytaj|utwórz|zrób|mogę|chcę|",
        r"musimy|ludzie|świat|czas|roku|lat|dzień|godzin)\b|[ąćęłńóśźż]",
    ))
    .expect("polish word pattern is valid")
});

static POLISH_GREETINGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(cześć|witaj|hej|dzień dobry|dobry wieczór|siema|cz|witam|hejka|jak się masz)\b")
        .expect("polish greeting pattern is valid")
});

const ENGLISH_GREETINGS: [&str; 5] = ["hello", "hi", "hey", "good morning", "good evening"];

/// Heuristic check for Polish text: diacritics, frequent Polish words,
/// or more Polish greetings than English ones.
pub fn is_polish(text: &str) -> bool {
    let lower = text.to_lowercase();

    if POLISH_WORDS.is_match(&lower) {
        return true;
    }

    let polish_greetings = POLISH_GREETINGS.find_iter(&lower).count();
    let english_greetings = ENGLISH_GREETINGS
        .iter()
        .filter(|g| lower.contains(*g))
        .count();

    polish_greetings > english_greetings
}

/// Instruction appended to the prompt so the model answers in the
/// language the user wrote in.
pub fn instruction_for(text: &str) -> &'static str {
    if is_polish(text) {
        "Proszę odpowiadaj po polsku."
    } else {
        "Please respond in English."
    }
}
