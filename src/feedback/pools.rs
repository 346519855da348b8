use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::detect::Label;

/// Immutable label -> message pool table with a fallback label.
#[derive(Clone, Debug)]
pub struct FeedbackPoolTable {
    pools: BTreeMap<Label, Vec<String>>,
    fallback: Label,
}

#[derive(Debug, Deserialize)]
struct PoolFile {
    fallback: Option<String>,
    pools: BTreeMap<String, Vec<String>>,
}

impl FeedbackPoolTable {
    /// Every pool must be non-empty and the fallback label must have a pool.
    pub fn new(pools: BTreeMap<Label, Vec<String>>, fallback: Label) -> Result<Self> {
        if let Some((label, _)) = pools.iter().find(|(_, pool)| pool.is_empty()) {
            return Err(anyhow!("feedback pool for '{}' is empty", label));
        }
        if !pools.contains_key(&fallback) {
            return Err(anyhow!("fallback label '{}' has no feedback pool", fallback));
        }
        Ok(Self { pools, fallback })
    }

    /// Load from JSON, or TOML when the file ends in `.toml`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read feedback pools {}", path.display()))?;
        let file: PoolFile = if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&raw)
                .with_context(|| format!("invalid feedback pools {}", path.display()))?
        } else {
            serde_json::from_str(&raw)
                .with_context(|| format!("invalid feedback pools {}", path.display()))?
        };
        let pools = file
            .pools
            .into_iter()
            .map(|(label, messages)| Ok((label.parse::<Label>()?, messages)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        let fallback = match file.fallback {
            Some(label) => label.parse()?,
            None => Label::Neutral,
        };
        Self::new(pools, fallback)
    }

    pub fn fallback(&self) -> Label {
        self.fallback
    }

    pub fn has_pool(&self, label: Label) -> bool {
        self.pools.contains_key(&label)
    }

    /// Pool for `label`, or the fallback pool when the label has none.
    pub fn pool_for(&self, label: Label) -> &[String] {
        self.pools
            .get(&label)
            .or_else(|| self.pools.get(&self.fallback))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl Default for FeedbackPoolTable {
    fn default() -> Self {
        let pools = BUILTIN_POOLS
            .iter()
            .map(|(label, messages)| {
                (
                    *label,
                    messages.iter().map(|message| message.to_string()).collect(),
                )
            })
            .collect();
        Self {
            pools,
            fallback: Label::Neutral,
        }
    }
}

const BUILTIN_POOLS: [(Label, [&str; 5]); 7] = [
    (
        Label::Happy,
        [
            "This face just won the lottery 🎉",
            "Smiling like free WiFi was found 😁",
            "Powered by chocolate 🍫",
            "Grinning like a meme template 😂",
            "Happy as a cat with a laser pointer 🐱",
        ],
    ),
    (
        Label::Sad,
        [
            "Thinking about Monday mornings 😢",
            "Lost WiFi connection 📶🚫",
            "Missing the last slice of pizza 🍕",
            "Remembering old Facebook posts 📸",
            "Crying over chopped onions 🧅",
        ],
    ),
    (
        Label::Angry,
        [
            "Someone ate their snacks 😡",
            "Laptop crashed without saving 💻🔥",
            "Standing in a long queue 🕐",
            "Auto-correct betrayed them 📱",
            "Traffic jam face 🚗🚗🚗",
        ],
    ),
    (
        Label::Surprised,
        [
            "Saw their exam results 😲",
            "Someone brought donuts 🍩",
            "The code worked first try 🤯",
            "Unexpected plot twist 🎬",
            "Dog just started talking 🐶",
        ],
    ),
    (
        Label::Fearful,
        [
            "Watching a horror movie alone 👻",
            "Heard a noise at 3 AM 🌙",
            "Checking electricity bill ⚡",
            "Trying roller coaster for first time 🎢",
            "Remembered embarrassing moment 😳",
        ],
    ),
    (
        Label::Disgusted,
        [
            "Tasted pineapple on pizza 🍍🍕",
            "Smelled mystery fridge food 🥴",
            "Stepped on something squishy 👟",
            "Read internet comments 📝",
            "Saw socks with sandals 🧦👡",
        ],
    ),
    (
        Label::Neutral,
        [
            "Loading… please wait ⏳",
            "Thinking about lunch 🍔",
            "Face of pure WiFi stability 📡",
            "Lost in deep thoughts 🧘",
            "The ultimate poker face 🎭",
        ],
    ),
];
