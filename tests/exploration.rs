use std::sync::Arc;

use oryx::prelude::*;
use oryx::testing::{const_vn, fresh_state, insn, op, target_vn, tmp_vn, ExitWith, TestLifter};

fn states_with_pcs(pcs: &[u64]) -> (Vec<State>, State) {
    let lifter = Arc::new(TestLifter::new());
    let (base, _builder) = fresh_state(AddressSpace::new(), lifter, 0x1000).unwrap();
    let states = pcs
        .iter()
        .map(|pc| {
            let mut s = base.clone();
            s.set_pc(*pc);
            s
        })
        .collect();
    (states, base)
}

#[test]
fn bfs_runs_states_in_discovery_order() {
    let (states, base) = states_with_pcs(&[0x10, 0x20, 0x30]);
    let mut bfs = BfsExploration::new(base);
    assert_eq!(bfs.next_state().unwrap().pc(), 0x1000);

    bfs.add_actives(states);
    assert_eq!(bfs.next_state().unwrap().pc(), 0x10);
    assert_eq!(bfs.next_state().unwrap().pc(), 0x20);
    assert_eq!(bfs.next_state().unwrap().pc(), 0x30);
    assert!(bfs.next_state().is_none());
}

#[test]
fn dfs_runs_the_latest_fork_first() {
    let (states, base) = states_with_pcs(&[0x10, 0x20, 0x30]);
    let mut dfs = DfsExploration::new(base);
    assert_eq!(dfs.next_state().unwrap().pc(), 0x1000);

    dfs.add_actives(states);
    assert_eq!(dfs.next_state().unwrap().pc(), 0x30);
    assert_eq!(dfs.next_state().unwrap().pc(), 0x20);
    assert_eq!(dfs.next_state().unwrap().pc(), 0x10);
}

#[test]
fn randomized_dfs_is_exhaustive_and_reproducible() {
    let (states, base) = states_with_pcs(&[0x10, 0x20, 0x30, 0x40]);
    let mut rand_a = RandDfsExploration::new(base.clone());
    rand_a.next_state().unwrap();
    rand_a.add_actives(states);

    let mut order_a = Vec::new();
    while let Some(s) = rand_a.next_state() {
        order_a.push(s.pc());
    }
    let mut sorted = order_a.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![0x10, 0x20, 0x30, 0x40]);

    // the fixed seed makes a second run identical
    let (states, base) = states_with_pcs(&[0x10, 0x20, 0x30, 0x40]);
    let mut rand_b = RandDfsExploration::new(base);
    rand_b.next_state().unwrap();
    rand_b.add_actives(states);

    let mut order_b = Vec::new();
    while let Some(s) = rand_b.next_state() {
        order_b.push(s.pc());
    }
    assert_eq!(order_a, order_b);
}

#[test]
fn coverage_prefers_new_addresses_over_revisits() {
    let (states, base) = states_with_pcs(&[0x1000, 0x2000]);
    let mut cov = CovExploration::new(base);
    cov.next_state().unwrap();

    // 0x1000 was already visited by the initial state; 0x2000 is new
    cov.add_actives(states);
    assert_eq!(cov.next_state().unwrap().pc(), 0x2000);
    assert_eq!(cov.next_state().unwrap().pc(), 0x1000);
}

#[test]
fn coverage_distinguishes_call_contexts() {
    let (states, base) = states_with_pcs(&[0x1000]);
    let mut cov = CovExploration::new(base.clone());
    cov.next_state().unwrap();

    // same pc, same (empty) context: a plain revisit
    cov.add_actives(states);

    // same pc in a fresh call context ranks above the revisit
    let mut in_call = base.clone();
    in_call.register_call(0x5005);
    cov.add_active(in_call);

    assert_eq!(cov.next_state().unwrap().stacktrace(), &[0x5005]);
    assert!(cov.next_state().unwrap().stacktrace().is_empty());
}

/// The cold branch loops over one address eight times before exiting; the hot
/// branch reaches the target through fresh addresses. Coverage-guided search
/// must not pay for the loop the way depth-first search does.
fn frontier_program() -> (Arc<TestLifter>, State) {
    let lifter = Arc::new(TestLifter::new());
    let rcx = lifter.reg_vn("RCX");
    let rdx = lifter.reg_vn("RDX");

    lifter.add_block(Block::new(vec![insn(
        0x1000,
        4,
        vec![
            op(OpCode::Copy, vec![const_vn(0, 8)], Some(rcx)),
            op(OpCode::CBranch, vec![target_vn(0x2000), rdx], None),
        ],
    )]));
    // cold: spin on 0x2000, then exit through the model at 0x9000
    lifter.add_block(Block::new(vec![
        insn(
            0x2000,
            4,
            vec![
                op(OpCode::IntAdd, vec![rcx, const_vn(1, 8)], Some(rcx)),
                op(OpCode::IntLess, vec![rcx, const_vn(8, 8)], Some(tmp_vn(0, 1))),
                op(OpCode::CBranch, vec![target_vn(0x2000), tmp_vn(0, 1)], None),
            ],
        ),
        insn(0x2004, 4, vec![op(OpCode::Branch, vec![target_vn(0x9000)], None)]),
    ]));
    // hot: two fresh blocks to the find address
    lifter.add_block(Block::new(vec![insn(
        0x1004,
        4,
        vec![op(OpCode::Branch, vec![target_vn(0x3000)], None)],
    )]));

    let (mut state, builder) = fresh_state(AddressSpace::new(), lifter.clone(), 0x1000).unwrap();
    let cond = builder.mk_sym("cond", 64);
    state.reg_write("RDX", &cond).unwrap();
    state.register_linked_function(0x9000, Arc::new(ExitWith(0)));
    (lifter, state)
}

#[test]
fn coverage_reaches_the_frontier_no_slower_than_dfs() {
    let (_lifter, state) = frontier_program();
    let mut dfs = ExecutorManager::new(&state, DfsExploration::new(state.clone()));
    let found = dfs.explore(&[0x3000], &[]).unwrap();
    assert!(found.is_some());
    let dfs_steps = dfs.steps_executed();

    let (_lifter, state) = frontier_program();
    let mut cov = ExecutorManager::new(&state, CovExploration::new(state.clone()));
    let found = cov.explore(&[0x3000], &[]).unwrap();
    assert!(found.is_some());
    let cov_steps = cov.steps_executed();

    assert!(
        cov_steps <= dfs_steps,
        "coverage took {cov_steps} steps, dfs took {dfs_steps}"
    );
    // and the loop really made dfs pay
    assert!(dfs_steps > cov_steps);
}

#[test]
fn gen_paths_enumerates_satisfiable_exits() {
    let lifter = Arc::new(TestLifter::new());
    let rdx = lifter.reg_vn("RDX");

    lifter.add_block(Block::new(vec![insn(
        0x1000,
        4,
        vec![op(OpCode::CBranch, vec![target_vn(0x9001), rdx], None)],
    )]));
    lifter.add_block(Block::new(vec![insn(
        0x1004,
        4,
        vec![op(OpCode::Branch, vec![target_vn(0x9002)], None)],
    )]));

    let (mut state, builder) = fresh_state(AddressSpace::new(), lifter, 0x1000).unwrap();
    let cond = builder.mk_sym("cond", 64);
    state.reg_write("RDX", &cond).unwrap();
    state.register_linked_function(0x9001, Arc::new(ExitWith(1)));
    state.register_linked_function(0x9002, Arc::new(ExitWith(2)));

    let mut manager = ExecutorManager::new(&state, BfsExploration::new(state.clone()));
    let mut retcodes = Vec::new();
    manager
        .gen_paths(|done| retcodes.push(done.retcode()))
        .unwrap();

    retcodes.sort_unstable();
    assert_eq!(retcodes, vec![1, 2]);
}
