//! Preset voice catalog for Kokoro.
//!
//! Voice ids encode their language and gender in the two-letter prefix
//! (`af_` = American female, `bm_` = British male, ...). Only the speaker id
//! is stored per voice; everything else is derived from the id.

use anyhow::{Result, anyhow};

/// Spoken language of a preset voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    AmericanEnglish,
    BritishEnglish,
    Spanish,
    French,
    Hindi,
    Italian,
    Japanese,
    Portuguese,
    Mandarin,
}

impl Language {
    const ALL: [Language; 9] = [
        Language::AmericanEnglish,
        Language::BritishEnglish,
        Language::Spanish,
        Language::French,
        Language::Hindi,
        Language::Italian,
        Language::Japanese,
        Language::Portuguese,
        Language::Mandarin,
    ];

    fn from_prefix(prefix: char) -> Option<Self> {
        match prefix {
            'a' => Some(Language::AmericanEnglish),
            'b' => Some(Language::BritishEnglish),
            'e' => Some(Language::Spanish),
            'f' => Some(Language::French),
            'h' => Some(Language::Hindi),
            'i' => Some(Language::Italian),
            'j' => Some(Language::Japanese),
            'p' => Some(Language::Portuguese),
            'z' => Some(Language::Mandarin),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Language::AmericanEnglish => "American English",
            Language::BritishEnglish => "British English",
            Language::Spanish => "Spanish",
            Language::French => "French",
            Language::Hindi => "Hindi",
            Language::Italian => "Italian",
            Language::Japanese => "Japanese",
            Language::Portuguese => "Portuguese BR",
            Language::Mandarin => "Mandarin Chinese",
        }
    }

    /// Language code for voices that go through espeak-ng instead of a lexicon.
    /// Empty for languages Kokoro ships lexicon files for.
    pub fn kokoro_lang(&self) -> &'static str {
        match self {
            Language::Spanish => "es",
            Language::French => "fr",
            Language::Hindi => "hi",
            Language::Italian => "it",
            Language::Japanese => "ja",
            Language::Portuguese => "pt-br",
            Language::AmericanEnglish | Language::BritishEnglish | Language::Mandarin => "",
        }
    }

    /// Lexicon files (relative to the model directory) used for this language.
    pub fn lexicons(&self) -> &'static [&'static str] {
        match self {
            Language::AmericanEnglish => &["lexicon-us-en.txt"],
            Language::BritishEnglish => &["lexicon-gb-en.txt"],
            Language::Mandarin => &["lexicon-us-en.txt", "lexicon-zh.txt"], // English fallback first
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Female,
    Male,
}

/// Everything known about one preset voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voice {
    pub name: &'static str,
    pub speaker_id: i32,
    pub language: Language,
    pub gender: Gender,
    pub label: Option<&'static str>, // Display name for featured voices
}

/// Kokoro v1.0 voices and their speaker ids, sorted by name.
const VOICES: &[(&str, i32)] = &[
    ("af_alloy", 0),
    ("af_aoede", 1),
    ("af_bella", 2),
    ("af_heart", 3),
    ("af_jessica", 4),
    ("af_kore", 5),
    ("af_nicole", 6),
    ("af_nova", 7),
    ("af_river", 8),
    ("af_sarah", 9),
    ("af_sky", 10),
    ("am_adam", 11),
    ("am_echo", 12),
    ("am_eric", 13),
    ("am_fenrir", 14),
    ("am_liam", 15),
    ("am_michael", 16),
    ("am_onyx", 17),
    ("am_puck", 18),
    ("am_santa", 19),
    ("bf_alice", 20),
    ("bf_emma", 21),
    ("bf_isabella", 22),
    ("bf_lily", 23),
    ("bm_daniel", 24),
    ("bm_fable", 25),
    ("bm_george", 26),
    ("bm_lewis", 27),
    ("ef_dora", 28),
    ("em_alex", 29),
    ("ff_siwis", 30),
    ("hf_alpha", 31),
    ("hf_beta", 32),
    ("hm_omega", 33),
    ("hm_psi", 34),
    ("if_sara", 35),
    ("im_nicola", 36),
    ("jf_alpha", 37),
    ("jf_gongitsune", 38),
    ("jf_nezumi", 39),
    ("jf_tebukuro", 40),
    ("jm_kumo", 41),
    ("pf_dora", 42),
    ("pm_alex", 43),
    ("pm_santa", 44),
    ("zf_xiaobei", 45),
    ("zf_xiaoni", 46),
    ("zf_xiaoxiao", 47),
    ("zf_xiaoyi", 48),
    ("zm_yunjian", 49),
    ("zm_yunxi", 50),
    ("zm_yunxia", 51),
    ("zm_yunyang", 52),
];

/// Voices shown first in listings.
const FEATURED: &[(&str, &str)] = &[
    ("af_heart", "Heart (Female, Warm)"),
    ("af_bella", "Bella (Female, Clear)"),
    ("af_sarah", "Sarah (Female, Professional)"),
    ("am_adam", "Adam (Male, Deep)"),
    ("am_michael", "Michael (Male, Neutral)"),
    ("bf_emma", "Emma (British Female)"),
    ("bm_george", "George (British Male)"),
];

/// Default preset voice.
pub const DEFAULT_VOICE: &str = "af_heart";

fn describe(name: &'static str, speaker_id: i32) -> Option<Voice> {
    let mut prefix = name.chars();
    let language = Language::from_prefix(prefix.next()?)?;
    let gender = match prefix.next()? {
        'f' => Gender::Female,
        'm' => Gender::Male,
        _ => return None,
    };
    let label = FEATURED.iter().find(|(n, _)| *n == name).map(|(_, label)| *label);

    Some(Voice { name, speaker_id, language, gender, label })
}

/// Look up a preset voice by id.
pub fn get_voice(name: &str) -> Option<Voice> {
    let idx = VOICES.binary_search_by_key(&name, |(n, _)| *n).ok()?;
    let (name, speaker_id) = VOICES[idx];
    describe(name, speaker_id)
}

/// All catalog voices in speaker id order.
pub fn all_voices() -> impl Iterator<Item = Voice> {
    VOICES.iter().filter_map(|(name, id)| describe(*name, *id))
}

/// Print all available voices.
pub fn print_voices() {
    println!("═══════════════════════════════════════════════════════════════════");
    println!("  Kokoro preset voices ({} voices)", VOICES.len());
    println!("═══════════════════════════════════════════════════════════════════");

    println!("\n── Featured ──");
    for (name, label) in FEATURED {
        println!("{:<15} {}", name, label);
    }

    for language in Language::ALL {
        let voices: Vec<Voice> = all_voices().filter(|v| v.language == language).collect();

        println!("\n── {} ({} voices) ──", language.label(), voices.len());
        println!("{:<15} {:<4} GENDER", "VOICE", "ID");
        println!("{}", "─".repeat(50));

        for voice in voices {
            println!("{:<15} {:<4} {:?}", voice.name, voice.speaker_id, voice.gender);
        }
    }

    println!("\n{}\n", "─".repeat(70));
    println!("Default: {}", DEFAULT_VOICE);
    println!();
    println!("Usage:");
    println!("  longform-tts --voice bf_emma \"Text to speak.\"");
    println!("  longform-tts --mode clone --ref-audio me.wav --ref-text \"Transcript\" \"Text to speak.\"");
}

/// Print detailed information about a specific voice.
///
/// # Errors
/// Returns an error if the voice is not in the catalog.
pub fn print_voice_info(name: &str) -> Result<()> {
    let voice = get_voice(name).ok_or_else(|| anyhow!("Voice '{}' not found. Run with --list-voices to see available voices", name))?;

    println!();
    println!("Voice: {}", voice.name);
    println!("{}", "─".repeat(40));
    if let Some(label) = voice.label {
        println!("Label:         {}", label);
    }
    println!("Speaker ID:    {}", voice.speaker_id);
    println!("Language:      {}", voice.language.label());
    println!("Gender:        {:?}", voice.gender);
    println!();
    println!("Usage:");
    println!("  longform-tts --voice {} \"Text to speak.\"", voice.name);
    println!();

    Ok(())
}
