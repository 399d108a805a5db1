// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use memrel_db::{ColumnDef, Database, Error, Expr, IndexDef, TableSchema, Transaction, col, lit};
use memrel_query::{
    AggregateCall, AggregateFunction, BuildContext, JoinCondition, JoinKind, Selection,
    SelectionExt, collect_rows, scan, scan_as,
};
use memrel_var::{DataType, Value, v_array, v_bool, v_float, v_int, v_null, v_text};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use test_case::test_case;

fn int_table(db: &mut Database, t: &Transaction, name: &str, values: &[i64], indexed: bool) {
    db.declare_table(
        t,
        TableSchema::new(name).column(ColumnDef::new("x", DataType::Int)),
    )
    .unwrap();
    if indexed {
        db.create_index(t, name, IndexDef::on(col(0))).unwrap();
    }
    db.insert_rows(t, name, values.iter().map(|v| vec![v_int(*v)]).collect())
        .unwrap();
}

fn sorted_values(selection: &Arc<dyn Selection>, t: &Transaction) -> Vec<Vec<Value>> {
    let mut rows: Vec<Vec<Value>> = collect_rows(selection.as_ref(), t)
        .unwrap()
        .into_iter()
        .map(|r| r.values.to_vec())
        .collect();
    rows.sort();
    rows
}

#[test_case(false, false ; "no indexes")]
#[test_case(true, false ; "index on preserved side")]
#[test_case(false, true ; "index on optional side")]
#[test_case(true, true ; "both indexed")]
fn test_left_join_pads_unmatched_rows(index_a: bool, index_b: bool) {
    let t = Transaction::root();
    let mut db = Database::default();
    int_table(&mut db, &t, "a", &[1, 2, 3], index_a);
    int_table(&mut db, &t, "b", &[2, 3], index_b);
    let ctx = BuildContext::new(&db);
    let a = scan(&db, "a").unwrap();
    let b = scan(&db, "b").unwrap();
    let on = a.column("a.x").unwrap().equals(Expr::Column(1));
    let join = a.join(&ctx, b, JoinKind::Left, JoinCondition::On(on)).unwrap();
    assert_eq!(
        sorted_values(&join, &t),
        vec![
            vec![v_int(1), v_null()],
            vec![v_int(2), v_int(2)],
            vec![v_int(3), v_int(3)]
        ]
    );
    let catastrophic = db.counters().catastrophic_joins.get();
    assert_eq!(catastrophic, u64::from(!index_a && !index_b));
}

#[test_case(false ; "no index")]
#[test_case(true ; "indexed")]
fn test_right_join(indexed: bool) {
    let t = Transaction::root();
    let mut db = Database::default();
    int_table(&mut db, &t, "a", &[2, 3], indexed);
    int_table(&mut db, &t, "b", &[1, 2, 3, 3], indexed);
    let ctx = BuildContext::new(&db);
    let join = scan(&db, "a")
        .unwrap()
        .join(
            &ctx,
            scan(&db, "b").unwrap(),
            JoinKind::Right,
            JoinCondition::Using(vec!["x".into()]),
        )
        .unwrap();
    assert_eq!(
        sorted_values(&join, &t),
        vec![
            vec![v_null(), v_int(1)],
            vec![v_int(2), v_int(2)],
            vec![v_int(3), v_int(3)],
            vec![v_int(3), v_int(3)]
        ]
    );
}

fn people(t: &Transaction) -> Database {
    let mut db = Database::default();
    db.declare_table(
        t,
        TableSchema::new("person")
            .column(ColumnDef::new("id", DataType::Int).primary_key())
            .column(ColumnDef::new("name", DataType::Text)),
    )
    .unwrap();
    db.declare_table(
        t,
        TableSchema::new("pet")
            .column(ColumnDef::new("owner", DataType::Int))
            .column(ColumnDef::new("kind", DataType::Text))
            .column(ColumnDef::new("age", DataType::Int)),
    )
    .unwrap();
    db.create_index(t, "pet", IndexDef::on(col(0)).named("pet_owner_idx"))
        .unwrap();
    db.insert_rows(
        t,
        "person",
        vec![
            vec![v_int(1), v_text("ann")],
            vec![v_int(2), v_text("bob")],
            vec![v_int(3), v_text("cy")],
        ],
    )
    .unwrap();
    db.insert_rows(
        t,
        "pet",
        vec![
            vec![v_int(1), v_text("cat"), v_int(3)],
            vec![v_int(1), v_text("dog"), v_int(9)],
            vec![v_int(2), v_text("cat"), v_int(12)],
            vec![v_int(4), v_text("eel"), v_int(1)],
        ],
    )
    .unwrap();
    db
}

#[test]
fn test_residual_predicate_filters_matches() {
    let t = Transaction::root();
    let db = people(&t);
    let ctx = BuildContext::new(&db);
    let person = scan_as(&db, "person", "p").unwrap();
    let pet = scan_as(&db, "pet", "q").unwrap();
    // p.id = q.owner and q.age > 5
    let on = col(0).equals(col(2)).and(col(4).gt(lit(5)));
    let join = person
        .join(&ctx, pet, JoinKind::Left, JoinCondition::On(on))
        .unwrap();
    let plan = join.explain(&t);
    assert!(plan.detail.contains("pet_owner_idx"), "{plan}");
    let names: Vec<Vec<Value>> = sorted_values(&join, &t)
        .into_iter()
        .map(|r| vec![r[1].clone(), r[3].clone()])
        .collect();
    assert_eq!(
        names,
        vec![
            vec![v_text("ann"), v_text("dog")],
            vec![v_text("bob"), v_text("cat")],
            vec![v_text("cy"), v_null()]
        ]
    );
    assert_eq!(db.counters().catastrophic_joins.get(), 0);
}

#[test]
fn test_joined_columns_resolve_by_qualifier() {
    let t = Transaction::root();
    let db = people(&t);
    let ctx = BuildContext::new(&db);
    let person = scan_as(&db, "person", "p").unwrap();
    let pet = scan_as(&db, "pet", "q").unwrap();
    let join = person
        .join(&ctx, pet, JoinKind::Inner, JoinCondition::On(col(0).equals(col(2))))
        .unwrap();
    assert_eq!(join.column("q.kind").unwrap(), col(3));
    assert_eq!(join.column("name").unwrap(), col(1));
    let names = join
        .filter(&ctx, join.column("q.kind").unwrap().equals(lit("cat")))
        .unwrap()
        .select(vec![(join.column("p.name").unwrap(), "name")])
        .unwrap();
    assert_eq!(
        sorted_values(&names, &t),
        vec![vec![v_text("ann")], vec![v_text("bob")]]
    );
}

#[test]
fn test_filter_after_join_uses_join_index() {
    let t = Transaction::root();
    let mut db = people(&t);
    db.create_index(&t, "person", IndexDef::on(col(1)).named("person_name_idx"))
        .unwrap();
    let ctx = BuildContext::new(&db);
    let join = scan(&db, "person")
        .unwrap()
        .join(
            &ctx,
            scan(&db, "pet").unwrap(),
            JoinKind::Inner,
            JoinCondition::On(col(0).equals(col(2))),
        )
        .unwrap();
    let filtered = join.filter(&ctx, col(1).equals(lit("ann"))).unwrap();
    let plan = filtered.explain(&t);
    assert_eq!(plan.operator, "IndexFilter");
    assert!(plan.detail.contains("join(person.person_name_idx)"), "{plan}");
    let kinds: Vec<Value> = sorted_values(&filtered, &t)
        .into_iter()
        .map(|r| r[3].clone())
        .collect();
    assert_eq!(kinds, vec![v_text("cat"), v_text("dog")]);
}

#[test]
fn test_malformed_joins_fail_at_build() {
    let t = Transaction::root();
    let db = people(&t);
    let ctx = BuildContext::new(&db);
    let person = scan(&db, "person").unwrap();
    let pet = scan(&db, "pet").unwrap();
    let full = person.join(
        &ctx,
        pet.clone(),
        JoinKind::Full,
        JoinCondition::On(col(0).equals(col(2))),
    );
    assert!(matches!(full, Err(Error::Unsupported(_))));
    let constant = person.join(
        &ctx,
        pet.clone(),
        JoinKind::Inner,
        JoinCondition::On(lit(1).equals(lit(1))),
    );
    assert!(matches!(constant, Err(Error::InvalidQuery(_))));
    let missing = person.join(&ctx, pet.clone(), JoinKind::Left, JoinCondition::None);
    assert!(matches!(missing, Err(Error::InvalidQuery(_))));
    let out_of_range = person.join(
        &ctx,
        pet.clone(),
        JoinKind::Inner,
        JoinCondition::On(col(0).equals(col(9))),
    );
    assert!(matches!(out_of_range, Err(Error::InvalidQuery(_))));
    let using_unknown = person.join(
        &ctx,
        pet,
        JoinKind::Inner,
        JoinCondition::Using(vec!["nope".into()]),
    );
    assert!(matches!(using_unknown, Err(Error::NotFound { .. })));
}

#[test]
fn test_join_strategy_follows_transaction_stats() {
    let root = Transaction::root();
    let mut db = Database::default();
    int_table(&mut db, &root, "a", &[1, 2], true);
    int_table(&mut db, &root, "b", &[1, 2, 3, 4, 5, 6], true);
    let ctx = BuildContext::new(&db);
    let join = scan(&db, "a")
        .unwrap()
        .join(
            &ctx,
            scan(&db, "b").unwrap(),
            JoinKind::Inner,
            JoinCondition::On(col(0).equals(col(1))),
        )
        .unwrap();
    assert!(join.explain(&root).detail.contains("drive left"));

    let child = root.fork();
    let a = db.get_table("a").unwrap();
    for i in 10..30 {
        a.insert_values(&child, vec![v_int(i)]).unwrap();
    }
    assert!(join.explain(&child).detail.contains("drive right"));
    assert_eq!(
        sorted_values(&join, &child),
        vec![vec![v_int(1), v_int(1)], vec![v_int(2), v_int(2)]]
    );
}

fn readings(t: &Transaction, indexed: bool) -> Database {
    let mut db = Database::default();
    db.declare_table(
        t,
        TableSchema::new("r")
            .column(ColumnDef::new("id", DataType::Int))
            .column(ColumnDef::new("v", DataType::Int))
            .column(ColumnDef::new("tag", DataType::Text)),
    )
    .unwrap();
    if indexed {
        db.create_index(t, "r", IndexDef::on(col(1)).named("r_v_idx"))
            .unwrap();
        db.create_index(t, "r", IndexDef::on(col(2)).named("r_tag_idx"))
            .unwrap();
    }
    db.insert_rows(
        t,
        "r",
        vec![
            vec![v_int(1), v_int(10), v_text("a")],
            vec![v_int(2), v_int(20), v_text("b")],
            vec![v_int(3), v_int(30), v_text("a")],
            vec![v_int(4), v_null(), v_null()],
        ],
    )
    .unwrap();
    db
}

#[test_case(false ; "sequential filter")]
#[test_case(true ; "index filter")]
fn test_count_over_filter(indexed: bool) {
    let t = Transaction::root();
    let db = readings(&t, indexed);
    let ctx = BuildContext::new(&db);
    let count = scan(&db, "r")
        .unwrap()
        .filter(&ctx, col(1).gt(lit(15)))
        .unwrap()
        .group_by(&ctx, vec![], vec![AggregateCall::count_star("n")])
        .unwrap();
    assert_eq!(sorted_values(&count, &t), vec![vec![v_int(2)]]);
    assert_eq!(count.columns()[0].name, "n");
}

#[test]
fn test_direct_aggregation_reads_no_rows() {
    let t = Transaction::root();
    let db = readings(&t, true);
    let ctx = BuildContext::new(&db);
    let direct = scan(&db, "r")
        .unwrap()
        .group_by(
            &ctx,
            vec![],
            vec![
                AggregateCall::count_star("n"),
                AggregateCall::new(AggregateFunction::Min, col(1), "lo"),
                AggregateCall::new(AggregateFunction::Max, col(1), "hi"),
            ],
        )
        .unwrap();
    assert!(direct.explain(&t).detail.starts_with("direct"));
    assert_eq!(
        sorted_values(&direct, &t),
        vec![vec![v_int(4), v_int(10), v_int(30)]]
    );
    assert_eq!(db.counters().direct_aggregations.get(), 1);
    assert_eq!(db.counters().sequential_aggregations.get(), 0);
}

#[test]
fn test_min_without_index_is_sequential() {
    let t = Transaction::root();
    let db = readings(&t, false);
    let ctx = BuildContext::new(&db);
    let agg = scan(&db, "r")
        .unwrap()
        .group_by(
            &ctx,
            vec![],
            vec![AggregateCall::new(AggregateFunction::Min, col(1), "lo")],
        )
        .unwrap();
    assert!(agg.explain(&t).detail.starts_with("sequential"));
    assert_eq!(sorted_values(&agg, &t), vec![vec![v_int(10)]]);
    assert_eq!(db.counters().sequential_aggregations.get(), 1);
}

#[test]
fn test_index_tier_matches_sequential() {
    let t = Transaction::root();
    let calls = || {
        vec![
            AggregateCall::count_star("n"),
            AggregateCall::new(AggregateFunction::Count, col(2), "c"),
            AggregateCall::new(AggregateFunction::Max, col(2), "m"),
        ]
    };
    let indexed = readings(&t, true);
    let ctx = BuildContext::new(&indexed);
    let by_index = scan(&indexed, "r")
        .unwrap()
        .group_by(&ctx, vec![col(2)], calls())
        .unwrap();
    assert!(by_index.explain(&t).detail.starts_with("index"));
    let expected = vec![
        vec![v_null(), v_int(1), v_int(0), v_null()],
        vec![v_text("a"), v_int(2), v_int(2), v_text("a")],
        vec![v_text("b"), v_int(1), v_int(1), v_text("b")],
    ];
    assert_eq!(sorted_values(&by_index, &t), expected);
    assert_eq!(indexed.counters().index_aggregations.get(), 1);

    let plain = readings(&t, false);
    let ctx = BuildContext::new(&plain);
    let sequential = scan(&plain, "r")
        .unwrap()
        .group_by(&ctx, vec![col(2)], calls())
        .unwrap();
    assert!(sequential.explain(&t).detail.starts_with("sequential"));
    assert_eq!(sorted_values(&sequential, &t), expected);
    assert_eq!(by_index.columns()[0].name, "tag");
}

#[test]
fn test_unsupported_aggregate_falls_back_to_sequential() {
    let t = Transaction::root();
    let db = readings(&t, true);
    let ctx = BuildContext::new(&db);
    let sums = scan(&db, "r")
        .unwrap()
        .group_by(
            &ctx,
            vec![col(2)],
            vec![AggregateCall::new(AggregateFunction::Sum, col(1), "total")],
        )
        .unwrap();
    assert!(sums.explain(&t).detail.starts_with("sequential"));
    assert_eq!(
        sorted_values(&sums, &t),
        vec![
            vec![v_null(), v_null()],
            vec![v_text("a"), v_int(40)],
            vec![v_text("b"), v_int(20)]
        ]
    );
}

#[test_case(false ; "sequential")]
#[test_case(true ; "indexed")]
fn test_empty_source_laws(indexed: bool) {
    let t = Transaction::root();
    let db = readings(&t, indexed);
    let ctx = BuildContext::new(&db);
    let nothing = scan(&db, "r")
        .unwrap()
        .filter(&ctx, col(1).gt(lit(100)))
        .unwrap();
    let totals = nothing
        .group_by(
            &ctx,
            vec![],
            vec![
                AggregateCall::count_star("n"),
                AggregateCall::new(AggregateFunction::Count, col(1), "c"),
                AggregateCall::new(AggregateFunction::Sum, col(1), "s"),
                AggregateCall::new(AggregateFunction::Avg, col(1), "a"),
                AggregateCall::new(AggregateFunction::Max, col(1), "m"),
                AggregateCall::new(AggregateFunction::ArrayAgg, col(1), "arr"),
                AggregateCall::new(AggregateFunction::BoolOr, col(1).gt(lit(0)), "any"),
            ],
        )
        .unwrap();
    assert_eq!(
        sorted_values(&totals, &t),
        vec![vec![
            v_int(0),
            v_int(0),
            v_null(),
            v_null(),
            v_null(),
            v_null(),
            v_null()
        ]]
    );
    let grouped = nothing
        .group_by(&ctx, vec![col(2)], vec![AggregateCall::count_star("n")])
        .unwrap();
    assert!(collect_rows(grouped.as_ref(), &t).unwrap().is_empty());
}

#[test]
fn test_value_aggregates() {
    let t = Transaction::root();
    let db = readings(&t, false);
    let ctx = BuildContext::new(&db);
    let agg = scan(&db, "r")
        .unwrap()
        .group_by(
            &ctx,
            vec![],
            vec![
                AggregateCall::new(AggregateFunction::Avg, col(1), "avg"),
                AggregateCall::new(AggregateFunction::ArrayAgg, col(0), "ids"),
                AggregateCall::string_agg(col(2), ",", "tags"),
                AggregateCall::new(AggregateFunction::Sum, col(1), "sum").distinct(),
                AggregateCall::new(AggregateFunction::BoolAnd, col(0).gt(lit(0)), "all"),
            ],
        )
        .unwrap();
    assert_eq!(
        sorted_values(&agg, &t),
        vec![vec![
            v_float(20.0),
            v_array([v_int(1), v_int(2), v_int(3), v_int(4)]),
            v_text("a,b,a"),
            v_int(60),
            v_bool(true)
        ]]
    );
}

#[test]
fn test_having_is_a_filter_over_groups() {
    let t = Transaction::root();
    let db = readings(&t, true);
    let ctx = BuildContext::new(&db);
    let groups = scan(&db, "r")
        .unwrap()
        .group_by(&ctx, vec![col(2)], vec![AggregateCall::count_star("n")])
        .unwrap();
    let having = groups
        .filter(&ctx, groups.column("n").unwrap().gt(lit(1)))
        .unwrap();
    assert_eq!(sorted_values(&having, &t), vec![vec![v_text("a"), v_int(2)]]);
}

#[test]
fn test_aggregate_argument_types_are_checked() {
    let t = Transaction::root();
    let db = readings(&t, false);
    let ctx = BuildContext::new(&db);
    let source = scan(&db, "r").unwrap();
    let sum_text = source.group_by(
        &ctx,
        vec![],
        vec![AggregateCall::new(AggregateFunction::Sum, col(2), "s")],
    );
    assert!(matches!(sum_text, Err(Error::InvalidQuery(_))));
    let out_of_range = source.group_by(&ctx, vec![col(7)], vec![AggregateCall::count_star("n")]);
    assert!(matches!(out_of_range, Err(Error::InvalidQuery(_))));
}
