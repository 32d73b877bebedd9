//! User-facing message texts
//!
//! All texts use Telegram's legacy Markdown (`*bold*`, `_italic_`, `` `code` ``).

use crate::config::TrackConfig;
use crate::quiz::{MatchOutcome, TrackHint, UserStats};
use crate::transport::{BotCommand, InlineButton, InlineKeyboard};
use crate::types::{Question, TrackSet};

pub const TRACK_CALLBACK_PREFIX: &str = "track_";
pub const TRACK_DONE_CALLBACK: &str = "track_done";

pub const WELCOME: &str = "🚀 *Welcome to the Data Engineering Coach!*\n\n\
I'm here to help you stay sharp by sending you *one high-quality thinking question* every day.\n\n\
📖 *How it works:*\n\
1. Select your tracks below.\n\
2. Tell me what time you want to be challenged.\n\
3. Reply to my questions with your logic/code.\n\
4. I'll evaluate your answer using AI and track your progress!\n\n\
*Choose your learning tracks:*";

pub const ASK_TIME: &str = "⏰ *One last thing!*\n\n\
At what time would you like to receive your daily questions?\n\
_(All times are UTC)_\n\n\
👉 *Reply with HH:MM* (24-hour format, e.g. `09:00` or `18:30`).\n\
Type *skip* to use the default (09:00).";

pub const DEFAULT_TIME_SELECTED: &str = "👌 Default time (09:00) selected.";
pub const INVALID_TIME_RANGE: &str = "❌ Invalid time. Please use HH:MM (00:00 - 23:59).";
pub const INVALID_TIME_FORMAT: &str =
    "❌ Invalid format. Please use HH:MM (e.g., 09:00) or type 'skip'.";

pub const ALREADY_DELIVERED_TODAY: &str = "✅ *Settings Updated!*\n\n\
You have already received your daily challenge today.\n\
I will send your next question tomorrow!";

pub const SETUP_REQUIRED: &str = "Please use /start to register and choose a track first.";
pub const ALL_COMPLETED: &str = "🎉 You have completed all questions in your selected tracks!";
pub const ALREADY_ANSWERED: &str = "✅ You have already answered this question!";
pub const PAUSED: &str = "⏸️ Daily quizzes paused. Use /start or /track to resume.";
pub const UNKNOWN_COMMAND: &str = "Unknown command. Use /help to see what I can do.";
pub const TEMPORARY_FAILURE: &str = "⚠️ Something went wrong on my side. Please try again later.";

pub const HELP: &str = "/start - Register and choose track\n\
/track - Change your learning track\n\
/stats - View your progress\n\
/stop - Pause daily messages";

/// Command menu published at startup
pub fn command_menu() -> Vec<BotCommand> {
    vec![
        BotCommand::new("start", "Start/Restart & Settings"),
        BotCommand::new("track", "Change tracks"),
        BotCommand::new("stats", "Check progress & streak"),
        BotCommand::new("help", "Get help"),
        BotCommand::new("stop", "Pause daily quizzes"),
    ]
}

/// One toggle button per configured track plus the "Done" button
pub fn track_keyboard(tracks: &[TrackConfig], selected: &TrackSet) -> InlineKeyboard {
    let mut rows: InlineKeyboard = tracks
        .iter()
        .map(|track| {
            let mark = if selected.contains(&track.id) { "✅" } else { "⬜" };
            vec![InlineButton::new(
                format!("{} {}", mark, track.label),
                format!("{}{}", TRACK_CALLBACK_PREFIX, track.id),
            )]
        })
        .collect();
    rows.push(vec![InlineButton::new("Done / Next ➡️", TRACK_DONE_CALLBACK)]);
    rows
}

/// Scheduled or initial question delivery
pub fn daily_challenge(question: &Question) -> String {
    format!(
        "📅 *Daily {} Challenge*\n\n🔹 *Difficulty:* {}\n\n{}\n\n👇 _Reply with your answer/code!_",
        question.track.to_uppercase(),
        question.difficulty.to_uppercase(),
        question.question_text
    )
}

pub fn time_set(time: &str) -> String {
    format!("🕒 Time set to {}.", time)
}

pub fn setup_complete(sent: usize) -> String {
    format!(
        "✅ *Setup Complete!*\n\nI have sent {} question(s) to get you started.\nGood luck!",
        sent
    )
}

pub fn hints(hints: &[TrackHint]) -> String {
    hints
        .iter()
        .map(|h| format!("🔍 *Hint for {}:*\n{}\n\n", h.track.to_uppercase(), h.hint))
        .collect()
}

pub fn stats(stats: &UserStats) -> String {
    let fires = "🔥".repeat(stats.fire_count());
    format!(
        "📊 *Your Progress Stats*\n\n\
         🏆 *Current Streak:* {} days {}\n\
         ──────────────────\n\
         ✅ *Correct:* {}\n\
         ❌ *Incorrect:* {}\n\
         📝 *Total Answered:* {}\n\
         🎯 *Accuracy:* {}%\n",
        stats.current_streak,
        fires,
        stats.total_correct,
        stats.total_incorrect,
        stats.total_answered,
        stats.accuracy
    )
}

/// Reply text for a matcher outcome
pub fn outcome(outcome: &MatchOutcome) -> String {
    match outcome {
        MatchOutcome::SetupRequired => SETUP_REQUIRED.to_string(),
        MatchOutcome::AllCompleted => ALL_COMPLETED.to_string(),
        MatchOutcome::AlreadyAnswered(_) => ALREADY_ANSWERED.to_string(),
        MatchOutcome::Hints(h) => hints(h),
        MatchOutcome::Correct { question, verdict } => format!(
            "✅ *Correct!* ({})\n\n{}\n\n💡 *Explanation:* {}\n\nSee you tomorrow!",
            question.track.to_uppercase(),
            verdict.feedback,
            question.explanation
        ),
        MatchOutcome::Incorrect { question, verdict } => format!(
            "❌ *Incorrect.* ({})\n\n{}\n\n👉 _Need a nudge? Reply with *hint* for a clue!_",
            question.track.to_uppercase(),
            verdict.feedback
        ),
    }
}
