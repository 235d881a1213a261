//! Traffic control integration tests.
//!
//! Each test gets its own network namespace with a dummy link.

use nltc::netlink::tc::{
    ClassAttrs, HfscClass, HfscQdisc, HtbClass, HtbClassParams, HtbQdisc, Ingress, Netem,
    NetemConfig, QdiscAttrs,
};
use nltc::netlink::{Class, Connection, Handle, Qdisc, TrafficControl};
use nltc::Result;

use crate::common::{TestNamespace, init_tracing};

const HTB_ROOT: Handle = Handle::new(0xffff, 0);

/// Set up a namespace with a dummy interface that is up.
async fn setup_tc_ns(name: &str) -> Result<(TestNamespace, TrafficControl<Connection>, u32)> {
    init_tracing();
    let ns = TestNamespace::new(name)?;
    ns.add_dummy("dummy0")?;
    ns.link_up("dummy0")?;

    let tc = TrafficControl::new(ns.connection()?);
    let link = tc.link_index("dummy0").await?;
    Ok((ns, tc, link))
}

/// Qdiscs on `link` that were configured explicitly.
///
/// Skips the kernel's handle-less default qdiscs (e.g. `noqueue` on an
/// idle dummy or the per-queue children of `mq`).
async fn configured_qdiscs(tc: &TrafficControl<Connection>, link: u32) -> Result<Vec<Qdisc>> {
    Ok(tc
        .qdisc_list(Some(link))
        .await?
        .into_iter()
        .filter(|q| !q.handle().is_none())
        .collect())
}

fn htb_root(link: u32) -> Qdisc {
    HtbQdisc::new(QdiscAttrs::new(link, HTB_ROOT, Handle::ROOT)).into()
}

fn htb_class(tc: &TrafficControl<Connection>, link: u32, minor: u16, rate: u64) -> HtbClass {
    let params = HtbClassParams::new(rate).cbuffer(1690);
    HtbClass::new(
        ClassAttrs::new(link, HTB_ROOT, Handle::new(0xffff, minor)),
        &params,
        tc.clock(),
    )
}

#[tokio::test]
async fn test_resolve_missing_link() -> Result<()> {
    require_root!();

    let (_ns, tc, _) = setup_tc_ns("ifname").await?;
    let err = tc.link_index("nope0").await.unwrap_err();
    assert!(err.is_not_found(), "{err}");

    Ok(())
}

#[tokio::test]
async fn test_htb_netem_tree() -> Result<()> {
    require_root!();

    let (_ns, tc, link) = setup_tc_ns("htb").await?;

    tc.qdisc_add(&htb_root(link)).await?;
    let qdiscs = configured_qdiscs(&tc, link).await?;
    assert_eq!(qdiscs.len(), 1);
    assert_eq!(qdiscs[0].kind(), "htb");
    assert_eq!(qdiscs[0].handle(), HTB_ROOT);

    let class = htb_class(&tc, link, 2, 1_234_000);
    tc.class_add(&class.clone().into()).await?;
    let classes = tc.class_list(link, HTB_ROOT).await?;
    assert_eq!(classes.len(), 1);
    let Class::Htb(got) = &classes[0] else {
        panic!("expected an htb class, got {:?}", classes[0]);
    };
    assert_eq!(got.attrs.handle, Handle::new(0xffff, 2));
    assert_eq!(got.rate, class.rate);
    assert_eq!(got.cbuffer, class.cbuffer);

    let config = NetemConfig::new().latency(64_000).loss(1.0).limit(500);
    let netem = Netem::new(
        QdiscAttrs::new(link, Handle::new(2, 0), Handle::new(0xffff, 2)),
        &config,
    )?;
    tc.qdisc_add(&netem.clone().into()).await?;

    let qdiscs = configured_qdiscs(&tc, link).await?;
    assert_eq!(qdiscs.len(), 2);
    assert_eq!(qdiscs[0].kind(), "htb");
    let Qdisc::Netem(got) = &qdiscs[1] else {
        panic!("expected netem, got {:?}", qdiscs[1]);
    };
    assert_eq!(got.attrs.parent, Handle::new(0xffff, 2));
    assert_eq!(got.limit, netem.limit);
    assert_eq!(got.loss, netem.loss);

    Ok(())
}

#[tokio::test]
async fn test_change_qdisc() -> Result<()> {
    require_root!();

    let (_ns, tc, link) = setup_tc_ns("change").await?;
    let root = Handle::new(1, 0);
    let netem = |limit| {
        let config = NetemConfig::new().latency(64_000).limit(limit);
        Netem::new(QdiscAttrs::new(link, root, Handle::ROOT), &config)
    };
    tc.qdisc_add(&netem(500)?.into()).await?;

    let mut other: Qdisc = netem(500)?.into();
    other.attrs_mut().handle = Handle::new(2, 0);
    assert!(tc.qdisc_change(&other).await.is_err());

    tc.qdisc_change(&netem(700)?.into()).await?;
    let Some(Qdisc::Netem(got)) = tc.qdisc_get(link, root).await? else {
        panic!("netem root missing");
    };
    assert_eq!(got.limit, 700);
    assert_eq!(configured_qdiscs(&tc, link).await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_replace_class() -> Result<()> {
    require_root!();

    let (_ns, tc, link) = setup_tc_ns("replace").await?;
    tc.qdisc_replace(&htb_root(link)).await?;
    tc.class_add(&htb_class(&tc, link, 2, 1_234_000).into())
        .await?;

    let faster = htb_class(&tc, link, 2, 8_000_000);
    tc.class_replace(&faster.clone().into()).await?;
    let classes = tc.class_list(link, HTB_ROOT).await?;
    assert_eq!(classes.len(), 1);
    let Class::Htb(got) = &classes[0] else {
        panic!("expected an htb class");
    };
    assert_eq!(got.rate, faster.rate);

    tc.class_replace(&htb_class(&tc, link, 3, 1_000_000).into())
        .await?;
    assert_eq!(tc.class_list(link, HTB_ROOT).await?.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_delete() -> Result<()> {
    require_root!();

    let (_ns, tc, link) = setup_tc_ns("delete").await?;
    tc.qdisc_add(&htb_root(link)).await?;
    let class: Class = htb_class(&tc, link, 2, 1_234_000).into();
    tc.class_add(&class).await?;
    tc.class_add(&htb_class(&tc, link, 3, 1_000_000).into())
        .await?;

    tc.class_del(&class).await?;
    assert_eq!(tc.class_list(link, HTB_ROOT).await?.len(), 1);

    let err = tc.class_del(&class).await.unwrap_err();
    assert!(err.is_not_found(), "{err}");

    tc.qdisc_del(&htb_root(link)).await?;
    assert!(configured_qdiscs(&tc, link).await?.is_empty());
    assert!(tc.class_list(link, HTB_ROOT).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_hfsc_classes() -> Result<()> {
    require_root!();

    let (_ns, tc, link) = setup_tc_ns("hfsc").await?;
    let root = Handle::new(1, 0);
    tc.qdisc_add(&HfscQdisc::new(QdiscAttrs::new(link, root, Handle::ROOT)).into())
        .await?;

    let mut class = HfscClass::new(ClassAttrs::new(link, root, Handle::new(1, 1)));
    class.set_sc_both(0, 0, 8_000_000);
    tc.class_add(&class.clone().into()).await?;

    let classes = tc.class_list(link, root).await?;
    let got = classes
        .iter()
        .find(|c| c.handle() == Handle::new(1, 1))
        .expect("hfsc class missing");
    let Class::Hfsc(got) = got else {
        panic!("expected an hfsc class");
    };
    // The kernel stores curves in its own fixed point; allow rounding.
    let close = |a: u32, b: u32| a.abs_diff(b) <= b / 100;
    assert!(close(got.rsc.m2, class.rsc.m2), "{:?}", got.rsc);
    assert!(close(got.fsc.m2, class.fsc.m2), "{:?}", got.fsc);

    Ok(())
}

#[tokio::test]
async fn test_ingress() -> Result<()> {
    require_root!();

    let (_ns, tc, link) = setup_tc_ns("ingress").await?;
    let ingress: Qdisc = Ingress::new(link).into();
    tc.qdisc_add(&ingress).await?;

    let qdiscs = configured_qdiscs(&tc, link).await?;
    assert!(qdiscs.iter().any(|q| q.kind() == "ingress" && q.parent().is_ingress()));

    tc.qdisc_del(&ingress).await?;
    let qdiscs = configured_qdiscs(&tc, link).await?;
    assert!(!qdiscs.iter().any(|q| q.kind() == "ingress"));

    Ok(())
}
