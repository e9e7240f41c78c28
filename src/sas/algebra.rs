//! Entailment, consistency, update, progression and regression over states
//!
//! All operations are pure: they never modify their inputs and return fresh
//! states.

use super::action::Action;
use super::state::{State, Value};

/// `s1 |= s2`: every variable defined in `s2` has the same value in `s1`
pub fn entails(s1: &State, s2: &State) -> bool {
    s2.defined().all(|(var, value)| s1.get(var) == Value::Defined(value))
}

/// `s1 ~ s2`: no variable is defined in both with different values
pub fn consistent(s1: &State, s2: &State) -> bool {
    let len = s1.len().max(s2.len());
    (0..len).all(|var| match (s1.get(var), s2.get(var)) {
        (Value::Defined(a), Value::Defined(b)) => a == b,
        _ => true,
    })
}

/// `s1 (+) s2`: variables defined in `s2` overwrite `s1`
pub fn update(s1: &State, s2: &State) -> State {
    let mut result = s1.clone();
    for (var, value) in s2.defined() {
        result.set(var, Value::Defined(value));
    }
    result
}

/// Apply effect `index` of `action` to `state`.
///
/// `None` when the state contradicts the precondition or the effect index is
/// out of range. Precondition values are folded in before the effect, so a
/// state undefined on precondition variables becomes defined on them.
pub fn progress(state: &State, action: &Action, index: usize) -> Option<State> {
    let effect = action.effect(index)?;
    if !consistent(state, action.precondition()) {
        return None;
    }
    Some(update(&update(state, action.precondition()), effect))
}

/// Regress `state` through effect `index` of `action`.
///
/// `None` when the state contradicts the effect. Precondition variables take
/// their precondition value; other variables whose value the effect itself
/// would have produced become undefined.
pub fn regress(state: &State, action: &Action, index: usize) -> Option<State> {
    let effect = action.effect(index)?;
    if !consistent(state, effect) {
        return None;
    }

    let precondition = action.precondition();
    let mut result = state.clone();
    for var in 0..state.len() {
        match precondition.get(var) {
            Value::Defined(value) => result.set(var, Value::Defined(value)),
            Value::Undefined => {
                if effect.get(var).is_defined() && effect.get(var) == state.get(var) {
                    result.set(var, Value::Undefined);
                }
            }
        }
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sas::action::{ActionName, ValueChange};

    /// Three boolean-ish variables; `a` needs var0=0, sets var1=1
    fn action_a() -> Action {
        Action::new(
            ActionName::parse("a").unwrap(),
            State::from_pairs(3, &[(0, 0)]),
            &[ValueChange { var: 1, prev: Value::Undefined, next: 1 }],
            1,
            &[2, 2, 2],
        )
    }

    fn all_states() -> Vec<State> {
        // every partial assignment over 3 variables with domain size 2
        let slot = [Value::Undefined, Value::Defined(0), Value::Defined(1)];
        let mut states = Vec::new();
        for a in slot {
            for b in slot {
                for c in slot {
                    states.push(State::from_values(vec![a, b, c]));
                }
            }
        }
        states
    }

    #[test]
    fn test_entails_matches_definition() {
        for s1 in all_states() {
            for s2 in all_states() {
                let expected = s2.defined().all(|(v, x)| s1.get(v) == Value::Defined(x));
                assert_eq!(entails(&s1, &s2), expected, "{} |= {}", s1, s2);
            }
        }
    }

    #[test]
    fn test_consistent_is_symmetric() {
        for s1 in all_states() {
            for s2 in all_states() {
                assert_eq!(consistent(&s1, &s2), consistent(&s2, &s1));
            }
        }
    }

    #[test]
    fn test_update_idempotent() {
        for s1 in all_states() {
            for s2 in all_states() {
                let once = update(&s1, &s2);
                assert_eq!(update(&once, &s2), once);
                assert!(entails(&once, &s2));
            }
        }
    }

    #[test]
    fn test_progress() {
        let action = action_a();
        let state = State::from_pairs(3, &[(2, 1)]);
        let next = progress(&state, &action, 0).unwrap();
        // precondition folded in, effect applied, untouched variable kept
        assert_eq!(next, State::from_indices(&[0, 1, 1]));

        let blocked = State::from_pairs(3, &[(0, 1)]);
        assert!(progress(&blocked, &action, 0).is_none());
        assert!(progress(&state, &action, 1).is_none());
    }

    #[test]
    fn test_regress() {
        let action = action_a();
        let state = State::from_indices(&[0, 1, 1]);
        let prev = regress(&state, &action, 0).unwrap();
        // var1 was produced by the effect, so it is cleared
        assert_eq!(prev.values(), &[Value::Defined(0), Value::Undefined, Value::Defined(1)]);

        let contradicting = State::from_pairs(3, &[(1, 0)]);
        assert!(regress(&contradicting, &action, 0).is_none());
    }

    #[test]
    fn test_regress_after_progress_restores_untouched_variables() {
        let action = action_a();
        let effect = action.effects()[0].clone();
        for state in all_states() {
            if !consistent(&state, &effect) {
                continue;
            }
            let Some(next) = progress(&state, &action, 0) else {
                continue;
            };
            let back = regress(&next, &action, 0).unwrap();
            for (var, value) in state.defined() {
                if effect.is_defined(var) && !action.precondition().is_defined(var) {
                    // the effect produced this value; regression forgets it
                    assert_eq!(back.get(var), Value::Undefined);
                } else {
                    assert_eq!(back.get(var), Value::Defined(value), "var{} of {}", var, state);
                }
            }
        }
    }
}
