//! Turns a short keyword into a full brocade generation prompt.
//!
//! A prompt is always three sections: the fixed base style, a subject picked
//! by the first [SubjectRule] whose trigger appears in the keyword (or the
//! generic fallback), and the fixed colour rule.

use std::fmt;

const BASE_STYLE: &str = "traditional Tujia brocade (Xilankapu) textile pattern, \
    pixel art style, cross-stitch embroidery texture, \
    visible woven thread grain, flat orthographic view, \
    strict geometric straight lines, no curves. ";

const ROCK_WALL_FLOWER: &str = "Subject: Traditional Tujia Brocade 'Rock Wall Flower' (Yanqianghua). \
    Composition: A vertical runner pattern (long strip). \
    Pattern: A continuous column of interlocking Hexagons and Diamonds. \
    Structure: The 'Eight-Hook' geometric skeleton frame. \
    Center: Abstract nested rhombuses, NOT a realistic flower. \
    Layout: Repeating pattern from top to bottom (Two-way continuous). \
    Style: NOT a square rug, but a long textile fabric. ";

const BIRD_TOTEM: &str = "Subject: Abstract geometric bird totem, sharp triangles, symmetric totem, repeating pattern. ";

const COLOR_RULE: &str = "Color Palette: \
    Background is 40% Indigo Blue (Deep Navy). \
    Decor is 30% Madder Red, 20% Gardenia Yellow, 10% Black outlines. \
    Solid color blocks, high contrast, no gradients, no blending. ";

/// A subject category: any trigger found in the keyword selects `subject`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubjectRule {
    /// Short label, used in logs
    pub name: &'static str,
    /// Substrings that select this rule
    pub triggers: &'static [&'static str],
    /// The subject section emitted when the rule fires
    pub subject: &'static str,
}

impl SubjectRule {
    /// True when any trigger is a substring of `keyword`.
    pub fn matches(&self, keyword: &str) -> bool {
        self.triggers.iter().any(|trigger| keyword.contains(trigger))
    }
}

/// The "Rock Wall Flower" runner, selected by flower and rock-wall keywords.
pub const FLOWER_RULE: SubjectRule = SubjectRule {
    name: "rock_wall_flower",
    triggers: &["花", "岩墙"],
    subject: ROCK_WALL_FLOWER,
};

/// The bird totem, selected by bird and cuckoo keywords.
pub const BIRD_RULE: SubjectRule = SubjectRule {
    name: "bird_totem",
    triggers: &["鸟", "阳雀"],
    subject: BIRD_TOTEM,
};

/// A composed generation prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prompt(String);

impl Prompt {
    /// The prompt text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first `chars` characters, for logging.
    pub fn preview(&self, chars: usize) -> String {
        self.0.chars().take(chars).collect()
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered rule list; the first matching rule wins.
#[derive(Clone, Debug)]
pub struct PromptBuilder {
    rules: Vec<SubjectRule>,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            rules: vec![FLOWER_RULE, BIRD_RULE],
        }
    }
}

impl PromptBuilder {
    /// A builder with no subject rules; everything takes the fallback.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Appends a rule at the lowest priority.
    pub fn with_rule(mut self, rule: SubjectRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// The rules in priority order
    pub fn rules(&self) -> &[SubjectRule] {
        &self.rules
    }

    /// Builds the prompt for `keyword`. Never fails, even on an empty keyword.
    pub fn build(&self, keyword: &str) -> Prompt {
        let subject = match self.rules.iter().find(|rule| rule.matches(keyword)) {
            Some(rule) => rule.subject.to_string(),
            None => fallback_subject(keyword),
        };
        Prompt(format!("{BASE_STYLE} {subject} {COLOR_RULE}"))
    }
}

fn fallback_subject(keyword: &str) -> String {
    format!("Subject: Geometric pattern based on concept '{keyword}', repeating abstract shapes. ")
}
