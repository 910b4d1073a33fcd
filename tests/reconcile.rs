//! End-to-end reconciliation against the simulated host

use vif_reconcile::driver;
use vif_reconcile::gateway::memory::{GatewayCall, Operation};
use vif_reconcile::{
    DesiredInterface, Error, InMemoryHypervisor, NetworkId, NetworkRecord, Reconciler, Slot,
    SlotAssigner,
};

const VM: &str = "OpaqueRef:vm";

struct Host {
    hv: InMemoryHypervisor,
    internal: NetworkId,
    external: NetworkId,
    pool: NetworkId,
}

fn host() -> Host {
    let hv = InMemoryHypervisor::new();
    let himn = hv.add_network(
        NetworkRecord::new("OpaqueRef:himn", "Host internal management network").management(),
    );
    let internal = hv.add_network(NetworkRecord::new("OpaqueRef:int", "Internal"));
    let external = hv.add_network(
        NetworkRecord::new("OpaqueRef:ext", "External").with_pif("OpaqueRef:pif1"),
    );
    let pool = hv.add_network(
        NetworkRecord::new("OpaqueRef:pool0", "Pool-wide network associated with eth0")
            .with_pif("OpaqueRef:pif0"),
    );
    hv.add_vm(VM);
    hv.attach(VM, Slot::RESERVED, &himn);
    Host {
        hv,
        internal,
        external,
        pool,
    }
}

fn mutations(calls: &[GatewayCall]) -> Vec<GatewayCall> {
    calls
        .iter()
        .filter(|c| {
            matches!(
                c,
                GatewayCall::NextAllowedSlot { .. } | GatewayCall::Create { .. } | GatewayCall::Destroy { .. }
            )
        })
        .cloned()
        .collect()
}

fn layout(hv: &InMemoryHypervisor) -> Vec<(u32, String)> {
    hv.interfaces(VM)
        .into_iter()
        .map(|v| (v.slot.index(), v.network.to_string()))
        .collect()
}

/// Every ordering of `items` (Heap's algorithm)
fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    fn heap<T: Clone>(k: usize, items: &mut Vec<T>, out: &mut Vec<Vec<T>>) {
        if k <= 1 {
            out.push(items.clone());
            return;
        }
        for i in 0..k {
            heap(k - 1, items, out);
            if k % 2 == 0 {
                items.swap(i, k - 1);
            } else {
                items.swap(0, k - 1);
            }
        }
    }
    let mut items = items.to_vec();
    let mut out = Vec::new();
    heap(items.len(), &mut items, &mut out);
    out
}

/// Small deterministic generator for property-style cases
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) % bound
    }
}

#[test]
fn test_single_interface_created() {
    let h = host();
    let reconciler = Reconciler::new(&h.hv);
    let desired = vec![DesiredInterface::new("Pool-wide network associated with eth0")];

    let plan = reconciler.plan(VM, &desired).unwrap();
    assert_eq!(plan.slot_map.get(Slot::new(1)).unwrap().network.id, h.pool);
    let to_create: Vec<_> = plan.diff.to_create.iter().map(|c| c.slot).collect();
    assert_eq!(to_create, vec![Slot::new(1)]);

    h.hv.clear_calls();
    reconciler.reconcile(VM, &desired).unwrap();

    assert_eq!(
        mutations(&h.hv.calls()),
        vec![
            GatewayCall::NextAllowedSlot { vm: VM.into() },
            GatewayCall::Create {
                vm: VM.into(),
                slot: Slot::new(1),
                network: h.pool.clone(),
            },
        ]
    );
}

#[test]
fn test_changed_network_destroyed_then_recreated() {
    let h = host();
    let old = h.hv.attach(VM, Slot::new(1), &h.external);
    let reconciler = Reconciler::new(&h.hv);
    let desired = vec![DesiredInterface::new("Internal").at(Slot::new(1))];

    let plan = reconciler.plan(VM, &desired).unwrap();
    assert_eq!(plan.diff.to_destroy[0].slot, Slot::new(1));
    assert_eq!(plan.diff.to_create[0].slot, Slot::new(1));

    h.hv.clear_calls();
    reconciler.reconcile(VM, &desired).unwrap();

    assert_eq!(
        mutations(&h.hv.calls()),
        vec![
            GatewayCall::Destroy { vif: old },
            GatewayCall::NextAllowedSlot { vm: VM.into() },
            GatewayCall::Create {
                vm: VM.into(),
                slot: Slot::new(1),
                network: h.internal.clone(),
            },
        ]
    );
    assert_eq!(
        layout(&h.hv),
        vec![(0, "OpaqueRef:himn".into()), (1, "OpaqueRef:int".into())]
    );
}

#[test]
fn test_drift_between_plan_and_apply_is_fatal() {
    let h = host();
    let reconciler = Reconciler::new(&h.hv);
    let plan = reconciler.plan(VM, &[DesiredInterface::new("Internal")]).unwrap();

    // someone else plugs eth1 before the pass applies
    h.hv.attach(VM, Slot::new(1), &h.external);
    h.hv.clear_calls();

    let err = driver::apply(VM, &plan.diff, &h.hv).unwrap_err();
    match err {
        Error::SlotMismatch { expected, actual } => {
            assert_eq!(expected, Slot::new(1));
            assert_eq!(actual, Slot::new(2));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(!h
        .hv
        .calls()
        .iter()
        .any(|c| matches!(c, GatewayCall::Create { .. })));
}

#[test]
fn test_network_names_case_insensitive() {
    let h = host();
    let reconciler = Reconciler::new(&h.hv);

    let plan = reconciler.plan(VM, &[DesiredInterface::new("internal")]).unwrap();
    assert_eq!(plan.slot_map.get(Slot::new(1)).unwrap().network.name, "Internal");

    match reconciler.reconcile(VM, &[DesiredInterface::new("Nope")]) {
        Err(Error::UnknownNetwork { requested, available }) => {
            assert_eq!(requested, "Nope");
            assert_eq!(
                available,
                "Internal (private), External (public), Pool-wide network associated with eth0 (public)"
            );
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_second_pass_is_noop() {
    let h = host();
    h.hv.attach(VM, Slot::new(1), &h.internal);
    h.hv.attach(VM, Slot::new(4), &h.external);
    let reconciler = Reconciler::new(&h.hv);
    let desired = vec![
        DesiredInterface::new("External"),
        DesiredInterface::new("Internal").at(Slot::new(3)),
        DesiredInterface::new("pool-wide network associated with eth0"),
    ];

    let first = reconciler.reconcile(VM, &desired).unwrap();
    assert!(!first.is_noop());

    h.hv.clear_calls();
    let second = reconciler.reconcile(VM, &desired).unwrap();
    assert!(second.is_noop());
    assert!(mutations(&h.hv.calls()).is_empty());
    assert!(reconciler.plan(VM, &desired).unwrap().diff.is_converged());

    assert_eq!(
        layout(&h.hv),
        vec![
            (0, "OpaqueRef:himn".into()),
            (1, "OpaqueRef:ext".into()),
            (2, "OpaqueRef:pool0".into()),
            (3, "OpaqueRef:int".into()),
        ]
    );
}

#[test]
fn test_assignment_independent_of_input_order() {
    let h = host();
    let reconciler = Reconciler::new(&h.hv);
    let desired = vec![
        DesiredInterface::new("Internal"),
        DesiredInterface::new("External"),
        DesiredInterface::new("Pool-wide network associated with eth0"),
        DesiredInterface::new("Internal"),
    ];

    let expected = reconciler.plan(VM, &desired).unwrap().slot_map;
    let names: Vec<_> = expected.iter().map(|a| a.network.name.clone()).collect();
    assert_eq!(
        names,
        vec![
            "External",
            "Internal",
            "Internal",
            "Pool-wide network associated with eth0"
        ]
    );

    for order in permutations(&desired) {
        assert_eq!(reconciler.plan(VM, &order).unwrap().slot_map, expected);
    }
}

#[test]
fn test_slots_in_range_and_distinct() {
    let h = host();
    let catalog = vif_reconcile::NetworkCatalog::build(&h.hv.snapshot().networks).unwrap();
    let names = ["Internal", "External", "Pool-wide network associated with eth0"];
    let mut rng = Lcg(7);

    for _ in 0..200 {
        let n = rng.next(6) as usize;
        let mut free: Vec<u32> = (1..=n as u32).collect();
        let desired: Vec<_> = (0..n)
            .map(|_| {
                let mut d = DesiredInterface::new(names[rng.next(3) as usize]);
                if !free.is_empty() && rng.next(3) == 0 {
                    let idx = rng.next(free.len() as u64) as usize;
                    d = d.at(Slot::new(free.remove(idx)));
                }
                d
            })
            .collect();

        let map = SlotAssigner::new(&catalog).assign(&desired, n).unwrap();
        let mut slots: Vec<u32> = map.iter().map(|a| a.slot.index()).collect();
        assert!(slots.iter().all(|s| (1..=n as u32).contains(s)));
        slots.sort_unstable();
        slots.dedup();
        assert_eq!(slots.len(), n);
    }
}

#[test]
fn test_diff_partitions_slots() {
    let h = host();
    let catalog = vif_reconcile::NetworkCatalog::build(&h.hv.snapshot().networks).unwrap();
    let nets = [&h.internal, &h.external, &h.pool];
    let names = ["Internal", "External", "Pool-wide network associated with eth0"];
    let mut rng = Lcg(42);

    for _ in 0..200 {
        let n = rng.next(5) as usize;
        let desired: Vec<_> = (0..n)
            .map(|_| DesiredInterface::new(names[rng.next(3) as usize]))
            .collect();
        let map = SlotAssigner::new(&catalog).assign(&desired, n).unwrap();

        let mut attached = Vec::new();
        for slot in 0..6u32 {
            if rng.next(2) == 0 {
                continue;
            }
            attached.push(vif_reconcile::AttachedInterface {
                slot: Slot::new(slot),
                reference: vif_reconcile::InterfaceRef::new(format!("OpaqueRef:v{}", slot)),
                network: nets[rng.next(3) as usize].clone(),
            });
        }

        let diff = vif_reconcile::diff::diff(&map, &attached);

        for want in map.iter() {
            let created = diff.to_create.iter().filter(|c| c.slot == want.slot).count();
            let kept = diff.unchanged.iter().filter(|s| **s == want.slot).count();
            assert_eq!(created + kept, 1, "desired {} misclassified", want.slot);
        }
        for current in attached.iter().filter(|a| !a.slot.is_reserved()) {
            let destroyed = diff.to_destroy.iter().filter(|d| d.slot == current.slot).count();
            let kept = diff.unchanged.iter().filter(|s| **s == current.slot).count();
            assert_eq!(destroyed + kept, 1, "attached {} misclassified", current.slot);
        }
        assert!(diff.to_destroy.iter().all(|d| !d.slot.is_reserved()));
    }
}

#[test]
fn test_partial_failure_converges_on_retry() {
    let h = host();
    let reconciler = Reconciler::new(&h.hv);
    let desired = vec![
        DesiredInterface::new("External"),
        DesiredInterface::new("Internal"),
        DesiredInterface::new("Pool-wide network associated with eth0"),
    ];

    h.hv.attach(VM, Slot::new(1), &h.internal);
    // eth1 is recreated on External, eth2 fails
    h.hv.fail_after(Operation::Create, 1, "VIF_CREATE_FAILED");
    let err = reconciler.reconcile(VM, &desired).unwrap_err();
    assert!(err.is_remote());
    assert_eq!(err.failed_slot(), Some(Slot::new(2)));
    assert_eq!(
        layout(&h.hv),
        vec![(0, "OpaqueRef:himn".into()), (1, "OpaqueRef:ext".into())]
    );

    let report = reconciler.reconcile(VM, &desired).unwrap();
    assert_eq!(report.unchanged, vec![Slot::new(1)]);
    assert_eq!(report.created.len(), 2);
    assert!(reconciler.plan(VM, &desired).unwrap().diff.is_converged());
}

#[test]
fn test_destroy_failure_aborts_before_creates() {
    let h = host();
    h.hv.attach(VM, Slot::new(1), &h.external);
    h.hv.attach(VM, Slot::new(2), &h.external);
    let reconciler = Reconciler::new(&h.hv);

    h.hv.fail_next(Operation::Destroy, "VIF_IN_USE");
    h.hv.clear_calls();
    let err = reconciler
        .reconcile(VM, &[DesiredInterface::new("Internal")])
        .unwrap_err();

    assert!(matches!(err, Error::Gateway { .. }));
    let muts = mutations(&h.hv.calls());
    assert_eq!(muts.len(), 1);
    assert!(matches!(muts[0], GatewayCall::Destroy { .. }));
}

#[test]
fn test_removing_all_interfaces() {
    let h = host();
    h.hv.attach(VM, Slot::new(1), &h.internal);
    h.hv.attach(VM, Slot::new(2), &h.external);
    let reconciler = Reconciler::new(&h.hv);

    let report = reconciler.reconcile(VM, &[]).unwrap();
    assert_eq!(report.destroyed.len(), 2);
    assert_eq!(layout(&h.hv), vec![(0, "OpaqueRef:himn".into())]);
}
