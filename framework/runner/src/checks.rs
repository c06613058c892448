use crosswind_instruments::CheckResult;

/// Evaluates named boolean checks against a value, usually a response.
///
/// Every check is evaluated, a failing check does not skip the ones after it.
///
/// ```rust
/// use crosswind_runner::prelude::check;
///
/// let status = 404;
/// let results = check(&status)
///     .that("status is 200", |s| *s == 200)
///     .that("status is 200 or 404", |s| *s == 200 || *s == 404)
///     .finish();
///
/// assert!(!results[0].passed);
/// assert!(results[1].passed);
/// ```
pub fn check<T: ?Sized>(subject: &T) -> Checks<'_, T> {
    Checks {
        subject,
        results: Vec::new(),
    }
}

pub struct Checks<'a, T: ?Sized> {
    subject: &'a T,
    results: Vec<CheckResult>,
}

impl<T: ?Sized> Checks<'_, T> {
    pub fn that(mut self, name: &str, predicate: impl FnOnce(&T) -> bool) -> Self {
        let passed = predicate(self.subject);
        if !passed {
            log::trace!("Check failed: {name}");
        }
        self.results.push(CheckResult::new(name, passed));
        self
    }

    pub fn finish(self) -> Vec<CheckResult> {
        self.results
    }
}
