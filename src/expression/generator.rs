//! Mergeable per-field evaluators
//!
//! Merge is associative and commutative for count, sum, min, max and
//! average. Plain field values and selectors keep the first non-null value,
//! which is stable because grouped rows agree on their grouped fields.

use std::sync::Arc;

use crate::codec::{CodecError, CodecResult, Input, Output};

use super::selection::Selection;
use super::val::Val;
use super::Expression;

const STATE_EMPTY: u8 = 0;
const STATE_VALUE: u8 = 1;
const STATE_COUNT: u8 = 2;
const STATE_MEAN: u8 = 3;

/// Accumulated state of one generator.
#[derive(Debug, Clone, PartialEq)]
pub enum State {
    Empty,
    Value(Val),
    Count(i64),
    Mean { sum: f64, count: i64 },
}

impl State {
    fn initial(expression: &Expression) -> State {
        match expression {
            Expression::Count => State::Count(0),
            Expression::Average { .. } => State::Mean { sum: 0.0, count: 0 },
            _ => State::Empty,
        }
    }

    fn value(&self) -> Option<&Val> {
        match self {
            State::Value(v) if !v.is_null() => Some(v),
            _ => None,
        }
    }

    fn write(&self, out: &mut Output) -> CodecResult<()> {
        match self {
            State::Empty => out.write_u8(STATE_EMPTY),
            State::Value(v) => {
                out.write_u8(STATE_VALUE);
                v.write(out)?;
            }
            State::Count(n) => {
                out.write_u8(STATE_COUNT);
                out.write_i64(*n);
            }
            State::Mean { sum, count } => {
                out.write_u8(STATE_MEAN);
                out.write_f64(*sum);
                out.write_i64(*count);
            }
        }
        Ok(())
    }

    fn read(input: &mut Input<'_>) -> CodecResult<State> {
        Ok(match input.read_u8()? {
            STATE_EMPTY => State::Empty,
            STATE_VALUE => State::Value(Val::read(input)?),
            STATE_COUNT => State::Count(input.read_i64()?),
            STATE_MEAN => State::Mean {
                sum: input.read_f64()?,
                count: input.read_i64()?,
            },
            tag => return Err(CodecError::InvalidTag { what: "generator state", tag }),
        })
    }
}

/// Evaluator for one output field of one stored row.
#[derive(Debug, Clone)]
pub struct Generator {
    expression: Arc<Expression>,
    state: State,
}

impl Generator {
    pub fn new(expression: Arc<Expression>) -> Self {
        let state = State::initial(&expression);
        Self { expression, state }
    }

    pub fn expression(&self) -> &Arc<Expression> {
        &self.expression
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Bind one raw row. Setting the same row twice leaves the same state.
    pub fn set(&mut self, row: &[Val]) {
        self.state = match self.expression.as_ref() {
            Expression::Count => State::Count(1),
            Expression::Average { .. } => match self.expression.evaluate(row) {
                Val::Double(x) => State::Mean { sum: x, count: 1 },
                _ => State::Mean { sum: 0.0, count: 0 },
            },
            expression => State::Value(expression.evaluate(row)),
        };
    }

    pub fn eval(&self) -> Val {
        match &self.state {
            State::Empty => Val::Null,
            State::Value(v) => v.clone(),
            State::Count(n) => Val::Integer(*n),
            State::Mean { sum, count } => {
                if *count > 0 {
                    Val::Double(sum / *count as f64)
                } else {
                    Val::Null
                }
            }
        }
    }

    pub fn merge(&mut self, other: &Generator) {
        let merged = match (self.expression.as_ref(), &self.state, &other.state) {
            (Expression::Count, State::Count(a), State::Count(b)) => State::Count(a + b),
            (Expression::Average { .. }, State::Mean { sum: s1, count: c1 }, State::Mean { sum: s2, count: c2 }) => {
                State::Mean {
                    sum: s1 + s2,
                    count: c1 + c2,
                }
            }
            (Expression::Sum { .. }, _, _) => {
                let a = self.state.value().cloned().unwrap_or_default();
                let b = other.state.value().cloned().unwrap_or_default();
                State::Value(a.add(&b))
            }
            (Expression::Min { .. }, _, _) => pick(&self.state, &other.state, |a, b| a.compare(b).is_le()),
            (Expression::Max { .. }, _, _) => pick(&self.state, &other.state, |a, b| a.compare(b).is_ge()),
            _ => match self.state.value() {
                Some(_) => return,
                None => other.state.clone(),
            },
        };
        self.state = merged;
    }

    /// Resolve a selector over the rows beneath this generator's item.
    /// Non-selectors ignore the selection and evaluate normally.
    pub fn select(&self, selection: &dyn Selection) -> Val {
        match self.expression.selector() {
            Some(selector) => selector.select(selection),
            None => self.eval(),
        }
    }

    pub fn write(&self, out: &mut Output) -> CodecResult<()> {
        self.state.write(out)
    }

    pub fn read(expression: Arc<Expression>, input: &mut Input<'_>) -> CodecResult<Self> {
        let state = State::read(input)?;
        Ok(Self { expression, state })
    }
}

fn pick(a: &State, b: &State, keep_a: impl Fn(&Val, &Val) -> bool) -> State {
    match (a.value(), b.value()) {
        (Some(x), Some(y)) => State::Value(if keep_a(x, y) { x.clone() } else { y.clone() }),
        (Some(x), None) => State::Value(x.clone()),
        (None, Some(y)) => State::Value(y.clone()),
        (None, None) => State::Value(Val::Null),
    }
}

/// Merge `other` into `target` field by field.
pub fn merge_generators(target: &mut [Option<Generator>], other: &[Option<Generator>]) {
    for (slot, incoming) in target.iter_mut().zip(other) {
        match (slot.as_mut(), incoming) {
            (Some(existing), Some(incoming)) => existing.merge(incoming),
            (None, Some(incoming)) => *slot = Some(incoming.clone()),
            _ => {}
        }
    }
}

/// Encode a generator set as `u32 count` then per field a presence flag and state.
pub fn write_generators(out: &mut Output, generators: &[Option<Generator>]) -> CodecResult<()> {
    let count = u32::try_from(generators.len()).map_err(|_| CodecError::LengthOverflow(generators.len()))?;
    out.write_u32(count);
    for generator in generators {
        match generator {
            Some(g) => {
                out.write_bool(true);
                g.write(out)?;
            }
            None => out.write_bool(false),
        }
    }
    Ok(())
}

/// Decode a generator set, re-attaching each state to its compiled expression.
pub fn read_generators(
    input: &mut Input<'_>,
    expressions: &[Option<Arc<Expression>>],
) -> CodecResult<Vec<Option<Generator>>> {
    let count = input.read_u32()? as usize;
    if count != expressions.len() {
        return Err(CodecError::FieldCountMismatch {
            expected: expressions.len(),
            found: count,
        });
    }

    let mut generators = Vec::with_capacity(count);
    for expression in expressions {
        let present = input.read_bool()?;
        match (present, expression) {
            (true, Some(expression)) => generators.push(Some(Generator::read(Arc::clone(expression), input)?)),
            (true, None) => {
                // No compiled expression to attach to: consume and discard.
                State::read(input)?;
                generators.push(None);
            }
            (false, _) => generators.push(None),
        }
    }
    Ok(generators)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;

    fn gen(expression: Expression, row: &[Val]) -> Generator {
        let mut g = Generator::new(Arc::new(expression));
        g.set(row);
        g
    }

    fn merged_in_order(expression: &Expression, rows: &[Vec<Val>]) -> Val {
        let mut iter = rows.iter();
        let mut acc = gen(expression.clone(), iter.next().unwrap());
        for row in iter {
            acc.merge(&gen(expression.clone(), row));
        }
        acc.eval()
    }

    #[test]
    fn test_count_merge() {
        let mut a = gen(Expression::count(), &[]);
        a.merge(&gen(Expression::count(), &[]));
        a.merge(&gen(Expression::count(), &[]));
        assert_eq!(a.eval(), Val::Integer(3));
    }

    #[test]
    fn test_set_is_idempotent() {
        let row = vec![Val::Integer(5)];
        let mut g = Generator::new(Arc::new(Expression::count()));
        g.set(&row);
        g.set(&row);
        assert_eq!(g.eval(), Val::Integer(1));
    }

    #[test]
    fn test_sum_ignores_nulls() {
        let mut a = gen(Expression::sum(Expression::field(0)), &[Val::Integer(2)]);
        a.merge(&gen(Expression::sum(Expression::field(0)), &[Val::Null]));
        a.merge(&gen(Expression::sum(Expression::field(0)), &[Val::Integer(5)]));
        assert_eq!(a.eval(), Val::Integer(7));
    }

    #[test]
    fn test_min_max() {
        let rows: Vec<Vec<Val>> = vec![vec![Val::Integer(4)], vec![Val::Null], vec![Val::Integer(-1)], vec![Val::Integer(9)]];
        assert_eq!(merged_in_order(&Expression::min(Expression::field(0)), &rows), Val::Integer(-1));
        assert_eq!(merged_in_order(&Expression::max(Expression::field(0)), &rows), Val::Integer(9));
    }

    #[test]
    fn test_average() {
        let rows: Vec<Vec<Val>> = vec![vec![Val::Integer(1)], vec![Val::Integer(2)], vec![Val::from("x")], vec![Val::Integer(6)]];
        assert_eq!(merged_in_order(&Expression::average(Expression::field(0)), &rows), Val::Double(3.0));
    }

    #[test]
    fn test_merge_order_independent() {
        let mut rows: Vec<Vec<Val>> = (0..50).map(|i| vec![Val::Integer(i * 7 % 23)]).collect();
        let expressions = [
            Expression::count(),
            Expression::sum(Expression::field(0)),
            Expression::min(Expression::field(0)),
            Expression::max(Expression::field(0)),
        ];
        let expected: Vec<Val> = expressions.iter().map(|e| merged_in_order(e, &rows)).collect();

        let mut rng = rand::thread_rng();
        for _ in 0..10 {
            rows.shuffle(&mut rng);
            for (expression, want) in expressions.iter().zip(&expected) {
                assert_eq!(&merged_in_order(expression, &rows), want);
            }
        }
    }

    #[test]
    fn test_merge_associative() {
        let e = Expression::sum(Expression::field(0));
        let a = gen(e.clone(), &[Val::Integer(1)]);
        let b = gen(e.clone(), &[Val::Integer(2)]);
        let c = gen(e.clone(), &[Val::Integer(3)]);

        let mut left = a.clone();
        left.merge(&b);
        left.merge(&c);

        let mut bc = b.clone();
        bc.merge(&c);
        let mut right = a.clone();
        right.merge(&bc);

        assert_eq!(left.eval(), right.eval());
    }

    #[test]
    fn test_field_keeps_first_non_null() {
        let mut a = gen(Expression::field(0), &[Val::Null]);
        a.merge(&gen(Expression::field(0), &[Val::from("x")]));
        a.merge(&gen(Expression::field(0), &[Val::from("y")]));
        assert_eq!(a.eval(), Val::from("x"));
    }

    #[test]
    fn test_generator_set_encoding() {
        let expressions = vec![
            Some(Arc::new(Expression::field(0))),
            None,
            Some(Arc::new(Expression::average(Expression::field(1)))),
        ];
        let row = vec![Val::from("k"), Val::Integer(4)];
        let generators: Vec<Option<Generator>> = expressions
            .iter()
            .map(|e| {
                e.as_ref().map(|e| {
                    let mut g = Generator::new(Arc::clone(e));
                    g.set(&row);
                    g
                })
            })
            .collect();

        let mut out = Output::new();
        write_generators(&mut out, &generators).unwrap();
        let bytes = out.into_bytes();
        let decoded = read_generators(&mut Input::new(&bytes), &expressions).unwrap();

        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].as_ref().unwrap().eval(), Val::from("k"));
        assert!(decoded[1].is_none());
        assert_eq!(decoded[2].as_ref().unwrap().eval(), Val::Double(4.0));
    }

    #[test]
    fn test_generator_set_field_count_mismatch() {
        let mut out = Output::new();
        write_generators(&mut out, &[None, None]).unwrap();
        let bytes = out.into_bytes();
        let err = read_generators(&mut Input::new(&bytes), &[None]).unwrap_err();
        assert_eq!(err, CodecError::FieldCountMismatch { expected: 1, found: 2 });
    }

    #[test]
    fn test_merge_generators_fills_missing() {
        let e = Arc::new(Expression::count());
        let mut target = vec![None, Some(Generator::new(Arc::clone(&e)))];
        let mut one = Generator::new(Arc::clone(&e));
        one.set(&[]);
        let other = vec![Some(one.clone()), Some(one)];
        merge_generators(&mut target, &other);
        assert_eq!(target[0].as_ref().unwrap().eval(), Val::Integer(1));
        assert_eq!(target[1].as_ref().unwrap().eval(), Val::Integer(1));
    }
}
