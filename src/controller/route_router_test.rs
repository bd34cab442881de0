//! Tests for canary routing rules on VirtualServices

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::controller::route_router::{merge_route, strip_to_master, RouteRouter};
    use crate::controller::router::Router;
    use crate::controller::test_support::*;
    use crate::controller::InMemoryStore;
    use crate::crd::{ClearMode, HttpMatchRequest, HttpRoute, StringMatch, CANARY_ROUTE_PREFIX};
    use crate::error::{Error, TrafficSpecProblem};
    use crate::selector::from_pairs;

    fn router(store: &Arc<InMemoryStore>) -> RouteRouter {
        RouteRouter::new(store.clone(), NAMESPACE)
    }

    fn header_canary(subset: &str, header: &str) -> HttpRoute {
        let shift = header_shift("x", &[(header, "on")]);
        let mut route = crate::controller::build_canary_route(&shift, subset);
        route.name = None;
        route
    }

    // -----------------------------------------------------------------------
    // validate
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_validate_weight_and_headers_are_exclusive() {
        let store = seeded_store().await;
        let router = router(&store);

        let missing = weighted_shift("2.1.3", 0);
        assert!(matches!(
            router.validate(&missing),
            Err(Error::InvalidTrafficSpec(TrafficSpecProblem::Missing))
        ));

        let mut both = weighted_shift("2.1.3", 10);
        both.traffic.request_headers = from_pairs([("x", "y")]);
        assert!(matches!(
            router.validate(&both),
            Err(Error::InvalidTrafficSpec(TrafficSpecProblem::Both))
        ));

        assert!(router.validate(&weighted_shift("2.1.3", 10)).is_ok());
        assert!(router
            .validate(&header_shift("2.1.3", &[("x", "y")]))
            .is_ok());
    }

    // -----------------------------------------------------------------------
    // update
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_weighted_update_appends_after_master() {
        let store = seeded_store().await;
        router(&store)
            .update(&weighted_shift("2.1.3", 20))
            .await
            .unwrap();

        let vs = stored_service(&store).await;
        assert_eq!(vs.spec.http.len(), 2);
        assert_eq!(vs.spec.http[0], master_route(), "master must be untouched");

        let canary = &vs.spec.http[1];
        assert_eq!(canary.name.as_deref(), Some("canary-213-7"));
        assert!(canary.matches.is_empty());
        assert_eq!(canary.route.len(), 1);
        assert_eq!(canary.route[0].weight, Some(20));
        assert_eq!(canary.route[0].destination.host, NAME);
        assert_eq!(canary.route[0].destination.subset.as_deref(), Some("213-7"));
        assert_eq!(canary.route[0].destination.port.as_ref().unwrap().number, 9080);
    }

    #[tokio::test]
    async fn test_header_update_builds_exact_matches() {
        let store = seeded_store().await;
        router(&store)
            .update(&header_shift("2.1.3", &[("x-canary", "true"), ("x-user", "qa")]))
            .await
            .unwrap();

        let vs = stored_service(&store).await;
        let canary = &vs.spec.http[1];
        assert_eq!(canary.route[0].weight, None);
        assert_eq!(canary.matches.len(), 1);
        assert_eq!(
            canary.matches[0].headers.get("x-canary"),
            Some(&StringMatch::exact("true"))
        );
        assert_eq!(
            canary.matches[0].headers.get("x-user"),
            Some(&StringMatch::exact("qa"))
        );
    }

    #[tokio::test]
    async fn test_update_twice_mutates_instead_of_duplicating() {
        let store = seeded_store().await;
        let router = router(&store);

        router.update(&weighted_shift("2.1.3", 20)).await.unwrap();
        router.update(&weighted_shift("2.1.3", 50)).await.unwrap();

        let vs = stored_service(&store).await;
        assert_eq!(vs.spec.http.len(), 2);
        assert_eq!(vs.spec.http[1].route[0].weight, Some(50));
    }

    #[tokio::test]
    async fn test_identical_update_writes_once() {
        let store = seeded_store().await;
        let router = router(&store);
        let shift = weighted_shift("2.1.3", 20);

        router.update(&shift).await.unwrap();
        router.update(&shift).await.unwrap();
        assert_eq!(store.writes(), 1);
    }

    #[test]
    fn test_switching_treatment_keeps_rule_distinct_from_master() {
        let mut vs = baseline_virtual_service(vec![master_route()]);
        let headers = header_shift("2.1.3", &[("x-canary", "true")]);
        assert!(merge_route(&mut vs, &headers, "213-7"));

        // An unnamed header rule switched to a weight loses its matches
        vs.spec.http[1].name = None;
        let weighted = weighted_shift("2.1.3", 30);
        assert!(!merge_route(&mut vs, &weighted, "213-7"));

        let canary = &vs.spec.http[1];
        assert!(canary.matches.is_empty());
        assert_eq!(canary.route[0].weight, Some(30));
        assert!(canary.name.as_deref().unwrap().starts_with(CANARY_ROUTE_PREFIX));
        assert!(!canary.is_master());
    }

    #[test]
    fn test_merge_never_mutates_master() {
        let mut master = master_route();
        master.route[0].destination.subset = Some("213-7".to_string());
        let mut vs = baseline_virtual_service(vec![master.clone()]);

        assert!(merge_route(&mut vs, &weighted_shift("2.1.3", 20), "213-7"));
        assert_eq!(vs.spec.http[0], master);
        assert_eq!(vs.spec.http.len(), 2);
    }

    // -----------------------------------------------------------------------
    // list
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_list_with_no_match_is_empty_resource_set() {
        let store = seeded_store().await;
        let err = router(&store)
            .list(&from_pairs([("app", "ratings")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyResourceSet(kind) if kind == "VirtualService"));
    }

    // -----------------------------------------------------------------------
    // clear
    // -----------------------------------------------------------------------

    #[test]
    fn test_strip_to_master_keeps_only_master() {
        let mut vs = baseline_virtual_service(vec![
            master_route(),
            header_canary("a-1", "x-a"),
            header_canary("b-2", "x-b"),
        ]);
        assert_eq!(strip_to_master(&mut vs), 2);
        assert_eq!(vs.spec.http, vec![master_route()]);
    }

    #[test]
    fn test_strip_to_master_preserves_order_of_survivors() {
        let catch_all = HttpRoute {
            name: Some("legacy".to_string()),
            matches: vec![HttpMatchRequest {
                uri: Some(StringMatch::prefix("/legacy")),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut vs = baseline_virtual_service(vec![
            header_canary("a-1", "x-a"),
            catch_all.clone(),
            header_canary("b-2", "x-b"),
            master_route(),
        ]);

        strip_to_master(&mut vs);
        assert_eq!(vs.spec.http, vec![catch_all, master_route()]);
    }

    #[tokio::test]
    async fn test_clear_removes_canaries_and_is_noop_on_master() {
        let store = seeded_store().await;
        let router = router(&store);

        router.update(&weighted_shift("2.1.3", 20)).await.unwrap();
        router
            .update(&header_shift("3.0", &[("x-beta", "1")]))
            .await
            .unwrap();
        assert_eq!(stored_service(&store).await.spec.http.len(), 3);

        router
            .clear(&weighted_shift("2.1.3", 20), ClearMode::Hard)
            .await
            .unwrap();
        assert_eq!(stored_service(&store).await.spec.http, vec![master_route()]);

        let writes = store.writes();
        router
            .clear(&weighted_shift("2.1.3", 20), ClearMode::Soft)
            .await
            .unwrap();
        assert_eq!(store.writes(), writes, "clearing [master] must not write");
    }
}
