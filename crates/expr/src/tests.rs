use super::*;

fn row(values: &[i32]) -> Tuple {
    Tuple::new(values.iter().map(|&v| Value::Int(v)).collect())
}

#[test]
fn int_comparisons() {
    let one = Value::Int(1);
    let two = Value::Int(2);
    assert!(CompareOp::Lt.compare(&one, &two).unwrap());
    assert!(CompareOp::Le.compare(&one, &one).unwrap());
    assert!(CompareOp::Ge.compare(&two, &one).unwrap());
    assert!(!CompareOp::Gt.compare(&one, &two).unwrap());
    assert!(CompareOp::Ne.compare(&one, &two).unwrap());
    assert!(CompareOp::Eq.compare(&two, &two).unwrap());
}

#[test]
fn like_on_text_is_substring_match() {
    let hay = Value::Text("alice".into());
    assert!(CompareOp::Like.compare(&hay, &Value::Text("lic".into())).unwrap());
    assert!(!CompareOp::Like.compare(&hay, &Value::Text("bob".into())).unwrap());
    assert!(CompareOp::Like.compare(&Value::Int(3), &Value::Int(3)).unwrap());
}

#[test]
fn mixed_types_are_rejected() {
    let err = CompareOp::Eq
        .compare(&Value::Int(1), &Value::Text("1".into()))
        .unwrap_err();
    assert!(matches!(err, DbError::Executor(_)));
}

#[test]
fn field_predicate_reads_the_designated_field() {
    let pred = Predicate::new(1, CompareOp::Gt, Value::Int(15));
    assert!(pred.matches(&row(&[1, 20])).unwrap());
    assert!(!pred.matches(&row(&[1, 10])).unwrap());
    assert!(pred.matches(&row(&[1])).is_err());
}

#[test]
fn closures_are_predicates() {
    let even = |t: &Tuple| t.values[0].as_int().is_some_and(|v| v % 2 == 0);
    assert!(even.matches(&row(&[4])).unwrap());
    assert!(!even.matches(&row(&[5])).unwrap());
}

#[test]
fn join_predicate_compares_across_tuples() {
    let pred = JoinPredicate::equals(0, 1);
    assert!(pred.matches(&row(&[7, 0]), &row(&[0, 7])).unwrap());
    assert!(!pred.matches(&row(&[7, 0]), &row(&[7, 0])).unwrap());

    let lt = JoinPredicate::new(0, CompareOp::Lt, 0);
    assert!(lt.matches(&row(&[1]), &row(&[2])).unwrap());
    assert_eq!(lt.to_string(), "l0 < r0");
}
