//! Verus Formal Verification for the quiet-hours evaluator
//!
//! Specifications and proofs for the window arithmetic in `src/evaluator.rs`
//! and `src/time.rs`.
//! To verify, install Verus and run: verus verification/verus/src/lib.rs
//!
//! Verus installation: https://github.com/verus-lang/verus

use vstd::prelude::*;

verus! {

pub const MINUTES_PER_DAY: u16 = 1440;

// ============================================================================
// WEEKDAY WRAP: previous weekday stays in 1..=7
// ============================================================================

/// Specification: weekday before `code`, Sunday (1) wrapping to Saturday (7)
#[spec]
pub fn spec_previous_weekday(code: u8) -> u8 {
    if code == 1 { 7 } else { (code - 1) as u8 }
}

/// Proof: the previous weekday of a valid code is a valid code
#[proof]
pub fn lemma_previous_weekday_in_range(code: u8)
    requires
        1 <= code <= 7,
    ensures
        1 <= spec_previous_weekday(code) <= 7,
{
}

/// Proof: next then previous is the identity
#[proof]
pub fn lemma_previous_of_next(code: u8)
    requires
        1 <= code <= 7,
    ensures
        spec_previous_weekday(((code % 7) + 1) as u8) == code,
{
}

/// Executable previous weekday with verified contract
#[exec]
pub fn previous_weekday_verified(code: u8) -> (result: u8)
    requires
        1 <= code <= 7,
    ensures
        result == spec_previous_weekday(code),
{
    if code == 1 { 7 } else { code - 1 }
}

// ============================================================================
// WINDOW MATCHING: same-day, overnight and degenerate windows
// ============================================================================

/// Specification: does a window block `minute` on `weekday`?
/// `today` / `yesterday` say whether the weekday and its predecessor are in
/// the period's day set.
#[spec]
pub fn spec_blocks(start: u16, end: u16, minute: u16, today: bool, yesterday: bool) -> bool {
    if start < end {
        today && start <= minute && minute < end
    } else if start > end {
        (today && minute >= start) || (yesterday && minute < end)
    } else {
        false
    }
}

/// Proof: a degenerate window never blocks
#[proof]
pub fn lemma_degenerate_never_blocks(t: u16, minute: u16, today: bool, yesterday: bool)
    ensures
        !spec_blocks(t, t, minute, today, yesterday),
{
}

/// Proof: same-day window is half-open [start, end)
#[proof]
pub fn lemma_same_day_half_open(start: u16, end: u16)
    requires
        start < end,
        end <= MINUTES_PER_DAY,
    ensures
        spec_blocks(start, end, start, true, false),
        !spec_blocks(start, end, end, true, false),
        start > 0 ==> !spec_blocks(start, end, (start - 1) as u16, true, false),
{
}

/// Proof: overnight window blocks at start on its day and at end-1 the day
/// after, and allows at end the day after
#[proof]
pub fn lemma_overnight_spans_midnight(start: u16, end: u16)
    requires
        start > end,
        end > 0,
        start < MINUTES_PER_DAY,
    ensures
        spec_blocks(start, end, start, true, false),
        spec_blocks(start, end, (end - 1) as u16, false, true),
        !spec_blocks(start, end, end, false, true),
{
}

/// Proof: a window whose days exclude both today and yesterday never blocks
#[proof]
pub fn lemma_no_days_never_blocks(start: u16, end: u16, minute: u16)
    ensures
        !spec_blocks(start, end, minute, false, false),
{
}

/// Executable matcher with verified contract
#[exec]
pub fn blocks_verified(start: u16, end: u16, minute: u16, today: bool, yesterday: bool) -> (result: bool)
    ensures
        result == spec_blocks(start, end, minute, today, yesterday),
{
    if start < end {
        today && start <= minute && minute < end
    } else if start > end {
        (today && minute >= start) || (yesterday && minute < end)
    } else {
        false
    }
}

// ============================================================================
// MINUTE OF DAY: hour/minute pairs map into 0..1440
// ============================================================================

/// Specification: minute-of-day for an hour and minute
#[spec]
pub fn spec_minute_of_day(hour: u8, minute: u8) -> int {
    hour as int * 60 + minute as int
}

/// Proof: valid components stay below one day
#[proof]
pub fn lemma_minute_of_day_bounded(hour: u8, minute: u8)
    requires
        hour < 24,
        minute < 60,
    ensures
        0 <= spec_minute_of_day(hour, minute) < MINUTES_PER_DAY,
{
}

} // verus!
