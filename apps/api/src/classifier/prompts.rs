// Triage prompt templates.
// All prompts for the classifier module are defined here.

pub const TRIAGE_SYSTEM: &str = "\
You are a precise workplace message triage assistant. \
Classify a single message into a priority bucket and extract action metadata. \
You MUST respond with valid JSON only — no markdown fences, no explanations. \
Score urgency HONESTLY on the 1-5 scale — never inflate a routine message. \
If urgency is unclear from the message, default to 3.";

pub const TRIAGE_PROMPT: &str = r#"Triage the following message from the user's {source} inbox.

MESSAGE:
{content}

OUTPUT SCHEMA (return exactly this structure):
{
  "classification": "urgent" | "action_required" | "waiting_on" | "fyi" | "noise",
  "summary": "one-sentence summary of what this message is about",
  "action_items": ["imperative task phrases, empty if none"],
  "sentiment": "positive" | "neutral" | "negative",
  "urgency_score": 1-5,
  "effort_estimate": "quick" | "medium" | "deep",
  "deadline": "explicit deadline mentioned in the message, or 'none'",
  "context_tags": ["short topical tags"],
  "stakeholders": ["people or teams named in the message"],
  "business_impact": "low" | "medium" | "high",
  "follow_up_needed": true | false
}

RULES:
1. urgency_score must be honest: newsletters and FYIs are 1-2, real blockers are 4-5
2. Extract deadlines exactly as written ("EOD Friday", "before the board meeting")
3. action_items are things the RECIPIENT must do, not the sender
4. Keep the summary under 30 words
5. Return ONLY the JSON object — nothing else, no code fences."#;
