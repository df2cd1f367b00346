use chrono::{NaiveDate, NaiveTime};
use validator::{Validate, ValidationErrors};

use crate::limits::*;
use crate::model::*;

use super::error::FieldError;
use super::EngineError;

/// Flatten validator output into sorted field errors.
fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                FieldError::new(field.to_string(), message)
            })
        })
        .collect();
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}

fn check_window(start: NaiveTime, end: NaiveTime, errors: &mut Vec<FieldError>) -> Option<Span> {
    if start < end {
        Some(Span::new(start, end))
    } else {
        errors.push(FieldError::new("end_time", "must be after start_time"));
        None
    }
}

fn finish<T>(value: Option<T>, errors: Vec<FieldError>) -> Result<T, EngineError> {
    match value {
        Some(v) if errors.is_empty() => Ok(v),
        _ => Err(EngineError::Validation(errors)),
    }
}

pub(crate) fn validate_location(req: &NewLocation) -> Result<(), EngineError> {
    match req.validate() {
        Ok(()) => Ok(()),
        Err(e) => Err(EngineError::Validation(field_errors(&e))),
    }
}

/// All field checks for a booking, reported together. Returns the requested span.
pub(crate) fn validate_booking(req: &NewBooking) -> Result<Span, EngineError> {
    let mut errors = match req.validate() {
        Ok(()) => Vec::new(),
        Err(e) => field_errors(&e),
    };
    let span = check_window(req.start_time, req.end_time, &mut errors);
    finish(span, errors)
}

pub(crate) fn validate_block(req: &NewBlock) -> Result<Span, EngineError> {
    let mut errors = Vec::new();
    if let BlockReason::Other(text) = &req.reason {
        if text.trim().is_empty() {
            errors.push(FieldError::new("reason", "other requires a description"));
        } else if text.len() > MAX_REASON_LEN {
            errors.push(FieldError::new("reason", "description too long"));
        }
    }
    let span = check_window(req.start_time, req.end_time, &mut errors);
    finish(span, errors)
}

/// Reject `span` if it overlaps any active booking or blocked window on `date`.
pub(crate) fn check_no_conflict(
    ls: &LocationState,
    date: NaiveDate,
    span: &Span,
) -> Result<(), EngineError> {
    match ls.overlapping(date, span).next() {
        Some(hit) => Err(EngineError::SlotConflict { conflicting: hit.id }),
        None => Ok(()),
    }
}

pub(crate) fn check_day_capacity(ls: &LocationState, date: NaiveDate) -> Result<(), EngineError> {
    if ls.day(date).len() >= MAX_INTERVALS_PER_DAY {
        return Err(EngineError::LimitExceeded("too many entries for this location and date"));
    }
    Ok(())
}
