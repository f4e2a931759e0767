use std::path::PathBuf;

use reftorch_bridge::{
    extract, BridgeError, ExprBuilder, Expected, Found, Handle, HandleTable, Node, NodeTag,
    OperandKind, Scale,
};

fn table_with(n: usize) -> (HandleTable<u8>, Vec<Handle>) {
    let mut table = HandleTable::new();
    let handles = (0..n).map(|i| table.allocate(i as u8)).collect();
    (table, handles)
}

fn type_mismatch(err: BridgeError) -> (usize, Expected, Found) {
    match err {
        BridgeError::TypeMismatch {
            position,
            expected,
            found,
        } => (position, expected, found),
        other => panic!("expected a type mismatch, got {:?}", other),
    }
}

#[test]
fn list_operand_keeps_source_order() {
    let (table, _) = table_with(0);
    let nodes = ExprBuilder::new().list(&[3, 4]).build();
    let mut args = extract(&nodes, 0, &[OperandKind::IntList], &table).expect("extract");
    assert_eq!(args.int_list().unwrap(), vec![3, 4]);
    assert_eq!(args.remaining(), 0);
}

#[test]
fn mixed_signature_decodes_each_kind() {
    let (table, hs) = table_with(2);
    let nodes = ExprBuilder::new()
        .num(hs[1].raw())
        .num(-1500)
        .list(&[hs[0].raw(), hs[1].raw()])
        .num(2)
        .build();
    let sig = [
        OperandKind::Handle,
        OperandKind::Real(Scale::Milli),
        OperandKind::HandleList,
        OperandKind::OptInt,
    ];
    let mut args = extract(&nodes, 0, &sig, &table).expect("extract");
    assert_eq!(args.handle().unwrap(), hs[1]);
    assert_eq!(args.real().unwrap(), -1.5);
    assert_eq!(args.handle_list().unwrap(), hs);
    assert_eq!(args.opt_int().unwrap(), Some(2));
}

#[test]
fn optional_operand_may_be_absent() {
    let (table, hs) = table_with(1);
    let nodes = vec![Node::Number(hs[0].raw())];
    let mut args = extract(
        &nodes,
        0,
        &[OperandKind::Handle, OperandKind::OptInt],
        &table,
    )
    .unwrap();
    args.handle().unwrap();
    assert_eq!(args.opt_int().unwrap(), None);
}

#[test]
fn character_where_number_expected_is_type_mismatch() {
    let (table, _) = table_with(0);
    let nodes = vec![Node::Number(1), Node::Char('x')];
    let err = extract(&nodes, 10, &[OperandKind::Int, OperandKind::Int], &table).unwrap_err();
    let (position, expected, found) = type_mismatch(err);
    assert_eq!(position, 11);
    assert_eq!(expected, Expected::Operand(OperandKind::Int));
    assert_eq!(found, Found::Tag(NodeTag::Char));
}

#[test]
fn dead_handle_is_unknown_not_mismatch() {
    let (table, _) = table_with(1);
    let nodes = vec![Node::Number(99)];
    let err = extract(&nodes, 0, &[OperandKind::Handle], &table).unwrap_err();
    assert_eq!(err, BridgeError::UnknownHandle(Handle::from_raw(99)));

    let listed = ExprBuilder::new().list(&[1, 42]).build();
    let err = extract(&listed, 0, &[OperandKind::HandleList], &table).unwrap_err();
    assert_eq!(err, BridgeError::UnknownHandle(Handle::from_raw(42)));
}

#[test]
fn arity_errors() {
    let (table, _) = table_with(0);

    let extra = vec![Node::Number(1), Node::Number(2)];
    let (position, expected, found) =
        type_mismatch(extract(&extra, 0, &[OperandKind::Int], &table).unwrap_err());
    assert_eq!(position, 1);
    assert_eq!(expected, Expected::End);
    assert_eq!(found, Found::Tag(NodeTag::Number));

    let short = vec![Node::Number(1)];
    let (position, _, found) = type_mismatch(
        extract(&short, 0, &[OperandKind::Int, OperandKind::Int], &table).unwrap_err(),
    );
    assert_eq!(position, 1);
    assert_eq!(found, Found::End);
}

#[test]
fn malformed_lists() {
    let (table, _) = table_with(0);

    let nested = ExprBuilder::new().open().num(1).list(&[2]).close().build();
    let (position, expected, found) =
        type_mismatch(extract(&nested, 0, &[OperandKind::IntList], &table).unwrap_err());
    assert_eq!(position, 2);
    assert_eq!(expected, Expected::ListElement);
    assert_eq!(found, Found::Tag(NodeTag::Open));

    let open = ExprBuilder::new().open().num(1).num(2).build();
    let (_, expected, found) =
        type_mismatch(extract(&open, 0, &[OperandKind::IntList], &table).unwrap_err());
    assert_eq!(expected, Expected::CloseBracket);
    assert_eq!(found, Found::End);

    let bare = vec![Node::Number(3)];
    let (_, expected, _) =
        type_mismatch(extract(&bare, 0, &[OperandKind::IntList], &table).unwrap_err());
    assert_eq!(expected, Expected::Operand(OperandKind::IntList));
}

#[test]
fn path_runs_to_end_of_span() {
    let (table, hs) = table_with(1);
    let nodes = ExprBuilder::new().num(hs[0].raw()).text("out/w.bin").build();
    let mut args = extract(&nodes, 0, &[OperandKind::Handle, OperandKind::Path], &table).unwrap();
    args.handle().unwrap();
    assert_eq!(args.path().unwrap(), PathBuf::from("out/w.bin"));

    let empty = vec![Node::Number(hs[0].raw())];
    assert!(matches!(
        extract(&empty, 0, &[OperandKind::Handle, OperandKind::Path], &table),
        Err(BridgeError::TypeMismatch { .. })
    ));

    let broken = ExprBuilder::new().text("a").num(1).build();
    assert!(matches!(
        extract(&broken, 0, &[OperandKind::Path], &table),
        Err(BridgeError::TypeMismatch { position: 1, .. })
    ));
}

#[test]
fn accessor_of_the_wrong_kind_is_a_fault() {
    let (table, _) = table_with(0);
    let nodes = vec![Node::Number(5)];
    let mut args = extract(&nodes, 0, &[OperandKind::Int], &table).unwrap();
    assert!(matches!(args.handle(), Err(BridgeError::NativeFault(_))));
    assert!(matches!(args.int(), Err(BridgeError::NativeFault(_))));
}
