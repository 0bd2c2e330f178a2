//! Frames computed through subroutines, with both interpreters

use jvm_analysis::jvm::analysis::*;
use jvm_analysis::jvm::code::BranchInstruction::*;
use jvm_analysis::jvm::code::Instruction::*;
use jvm_analysis::jvm::code::*;
use jvm_analysis::jvm::MethodAccessFlags;
use std::collections::BTreeSet;

fn builder() -> CodeBuilder {
    let signature = MethodSignature::parse("C", "m", "()V", MethodAccessFlags::PUBLIC).unwrap();
    CodeBuilder::new(signature)
}

/// `try { a++; } finally { a--; }` with the `finally` in a subroutine leaving two values behind
///
/// ```text
///  0: iconst_0           9: iinc 1 -1
///  1: istore_1          10: iconst_0
///  2: iinc 1 1          11: iconst_0
///  3: goto 13           12: ret 2
///  4: astore_3          13: jsr 8
///  5: jsr 8             14: iconst_0
///  6: aload_3           15: iconst_0
///  7: athrow            16: return
///  8: astore_2
/// ```
fn try_finally() -> MethodBody {
    let mut code = builder();
    let (l0, l1, l2, l3, l4) = (
        code.fresh_label(),
        code.fresh_label(),
        code.fresh_label(),
        code.fresh_label(),
        code.fresh_label(),
    );

    code.push_instruction(IConst0);
    code.push_instruction(IStore(1));
    code.place_label(l0).unwrap();
    code.push_instruction(IInc(1, 1));
    code.push_branch_instruction(Goto(l1));

    code.place_label(l2).unwrap();
    code.push_instruction(AStore(3));
    code.push_branch_instruction(Jsr(l3));
    code.push_instruction(ALoad(3));
    code.push_branch_instruction(AThrow);

    code.place_label(l3).unwrap();
    code.push_instruction(AStore(2));
    code.push_instruction(IInc(1, -1));
    code.push_instruction(IConst0);
    code.push_instruction(IConst0);
    code.push_branch_instruction(Ret(2));

    code.place_label(l1).unwrap();
    code.push_branch_instruction(Jsr(l3));
    code.push_instruction(IConst0);
    code.push_instruction(IConst0);
    code.place_label(l4).unwrap();
    code.push_branch_instruction(Return);

    code.add_exception_handler(l0, l2, l2, None);
    code.add_exception_handler(l1, l4, l2, None);
    code.result().unwrap()
}

fn frame_string<V: Value>(frames: &Frames<'_, '_, V>, insn: usize, context: ContextId) -> String {
    match frames.frame(InsnIndex(insn), context) {
        Some(frame) => frame.to_string(),
        None => String::from("-"),
    }
}

#[test]
fn basic_values_through_try_finally() {
    let _ = env_logger::builder().is_test(true).try_init();

    let body = try_finally();
    let graph = ResolvedGraph::build(&body).unwrap();
    let frames = Analyzer::new(BasicInterpreter::new())
        .analyze(&graph)
        .unwrap();
    let empty = ContextId::EMPTY;

    assert_eq!(frame_string(&frames, 0, empty), "LC;... ");
    assert_eq!(frame_string(&frames, 2, empty), "LC;I.. ");

    // The handler is reached before and after the subroutine has stored its return address, so
    // that slot is unusable there
    assert_eq!(
        frame_string(&frames, 4, empty),
        "LC;I.. Ljava/lang/Throwable;"
    );
    assert!(frames.conflicts().is_empty());

    // Inside the subroutine, both callers are merged
    let contexts = frames.contexts_at(InsnIndex(8));
    assert_eq!(contexts.len(), 1);
    assert_eq!(frame_string(&frames, 8, contexts[0]), "LC;I.. A");
    assert_eq!(frame_string(&frames, 12, contexts[0]), "LC;IA. II");
    assert_eq!(frame_string(&frames, 8, empty), "-");

    // ... but each continuation gets back the slot the subroutine never writes
    assert_eq!(
        frame_string(&frames, 6, empty),
        "LC;IALjava/lang/Throwable; II"
    );
    assert_eq!(frame_string(&frames, 14, empty), "LC;IA. II");
    assert_eq!(frame_string(&frames, 16, empty), "LC;IA. IIII");
}

#[test]
fn sources_through_try_finally() {
    let body = try_finally();
    let graph = ResolvedGraph::build(&body).unwrap();
    let frames = Analyzer::new(SourceInterpreter).analyze(&graph).unwrap();
    let empty = ContextId::EMPTY;
    let insns = |indices: &[usize]| -> BTreeSet<Origin> {
        indices
            .iter()
            .map(|idx| Origin::Instruction(InsnIndex(*idx)))
            .collect()
    };

    // Both handlers land on the same code
    let handler = frames.frame(InsnIndex(4), empty).unwrap();
    assert_eq!(handler.stack.len(), 1);
    assert_eq!(handler.stack[0].to_string(), "1{h0,h1}");

    // The return address comes from either `jsr`
    let context = frames.contexts_at(InsnIndex(8))[0];
    assert_eq!(
        frames.sources_of(InsnIndex(8), context, 0),
        Some(&insns(&[5, 13]))
    );

    // Values pushed in the subroutine are still there after it returns
    assert_eq!(
        frames.sources_of(InsnIndex(16), empty, 3),
        Some(&insns(&[10]))
    );
    assert_eq!(
        frames.sources_of(InsnIndex(16), empty, 2),
        Some(&insns(&[11]))
    );
    assert_eq!(
        frames.sources_of(InsnIndex(16), empty, 0),
        Some(&insns(&[15]))
    );
    assert_eq!(frames.sources_of(InsnIndex(16), empty, 4), None);

    // The caller's own store is not affected by the subroutine
    let after_return = frames.frame(InsnIndex(6), empty).unwrap();
    assert_eq!(after_return.locals[3].origins, insns(&[4]));
    assert_eq!(
        after_return.locals[0].origins,
        BTreeSet::from([Origin::Entry])
    );
}

/// One subroutine called from the method body and from inside another subroutine
///
/// ```text
///  0: iconst_0           6: fconst_0
///  1: istore_1           7: fstore_1
///  2: jsr 10             8: jsr 10
///  3: jsr 5              9: ret 2
///  4: return            10: astore_3
///  5: astore_2          11: ret 3
/// ```
fn shared_subroutine() -> MethodBody {
    let mut code = builder();
    let outer = code.fresh_label();
    let inner = code.fresh_label();

    code.push_instruction(IConst0);
    code.push_instruction(IStore(1));
    code.push_branch_instruction(Jsr(inner));
    code.push_branch_instruction(Jsr(outer));
    code.push_branch_instruction(Return);

    code.place_label(outer).unwrap();
    code.push_instruction(AStore(2));
    code.push_instruction(FConst0);
    code.push_instruction(FStore(1));
    code.push_branch_instruction(Jsr(inner));
    code.push_branch_instruction(Ret(2));

    code.place_label(inner).unwrap();
    code.push_instruction(AStore(3));
    code.push_branch_instruction(Ret(3));
    code.result().unwrap()
}

#[test]
fn contexts_are_kept_apart() {
    let _ = env_logger::builder().is_test(true).try_init();

    let body = shared_subroutine();
    let graph = ResolvedGraph::build(&body).unwrap();
    let interpreter = BasicInterpreter::new();
    let frames = Analyzer::new(interpreter).analyze(&graph).unwrap();

    let at_inner: BTreeSet<String> = frames
        .frames_at(InsnIndex(10))
        .map(|(_, frame)| frame.to_string())
        .collect();
    assert_eq!(
        at_inner,
        BTreeSet::from([String::from("LC;I.. A"), String::from("LC;FAA A")])
    );

    let depths: BTreeSet<usize> = frames
        .contexts_at(InsnIndex(10))
        .iter()
        .map(|context| graph.context(*context).len())
        .collect();
    assert_eq!(depths, BTreeSet::from([1, 2]));

    // Nothing ever gets merged across contexts
    assert!(frames.conflicts().is_empty());

    // Returns go back to the right caller with the right locals
    assert_eq!(frame_string(&frames, 3, ContextId::EMPTY), "LC;I.A ");
    assert_eq!(frame_string(&frames, 4, ContextId::EMPTY), "LC;FAA ");
    let outer_context = frames.contexts_at(InsnIndex(9))[0];
    assert_eq!(frame_string(&frames, 9, outer_context), "LC;FAA ");

    // The summary across contexts is lossy
    let interpreter = BasicInterpreter::new();
    let merged = frames.merged_frame(InsnIndex(10), &interpreter).unwrap();
    assert_eq!(merged.to_string(), "LC;X.. A");
    assert!(frames.merged_frame(InsnIndex(4), &interpreter).is_some());
}

#[test]
fn write_sets_include_nested_subroutines() {
    let body = shared_subroutine();
    let graph = ResolvedGraph::build(&body).unwrap();

    let outer = graph.subroutine_at(graph.graph().block_of(InsnIndex(5))).unwrap();
    let inner = graph.subroutine_at(graph.graph().block_of(InsnIndex(10))).unwrap();
    let writes = |id| -> Vec<usize> { graph.subroutine(id).write_set.iter().collect() };

    assert_eq!(writes(inner), vec![3]);
    assert_eq!(writes(outer), vec![1, 2, 3]);
    assert_eq!(graph.subroutine(outer).call_sites.len(), 1);
    assert_eq!(graph.subroutine(inner).call_sites.len(), 2);
}

/// Local 1 holds an `int` on one path and a `float` on the other
///
/// ```text
///  0: iconst_0           5: fconst_0
///  1: ifne 5             6: fstore_1
///  2: iconst_0           7: return
///  3: istore_1
///  4: goto 7
/// ```
fn mixed_kinds() -> MethodBody {
    let mut code = builder();
    let other = code.fresh_label();
    let join = code.fresh_label();
    code.push_instruction(IConst0);
    code.push_branch_instruction(If(OrdComparison::NE, other));
    code.push_instruction(IConst0);
    code.push_instruction(IStore(1));
    code.push_branch_instruction(Goto(join));
    code.place_label(other).unwrap();
    code.push_instruction(FConst0);
    code.push_instruction(FStore(1));
    code.place_label(join).unwrap();
    code.push_branch_instruction(Return);
    code.result().unwrap()
}

#[test]
fn conflicting_kinds() {
    let body = mixed_kinds();
    let graph = ResolvedGraph::build(&body).unwrap();
    let frames = Analyzer::new(BasicInterpreter::new())
        .analyze(&graph)
        .unwrap();
    assert_eq!(frame_string(&frames, 7, ContextId::EMPTY), "LC;X ");
    assert_eq!(
        frames.conflicts(),
        &[Conflict {
            block: InsnIndex(7),
            context: ContextId::EMPTY,
            location: Location::Local(1),
        }]
    );

    let settings = Settings {
        record_conflicts: false,
        ..Settings::default()
    };
    let frames = Analyzer::with_settings(BasicInterpreter::new(), settings)
        .analyze(&graph)
        .unwrap();
    assert!(frames.conflicts().is_empty());
    assert_eq!(frame_string(&frames, 7, ContextId::EMPTY), "LC;X ");
}
