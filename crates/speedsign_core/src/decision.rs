//! Motor de decisão – regras de Overspeed e Temporary.
//!
//! Avaliação pura: o único estado entre ticks é o [`OverspeedTracker`], que
//! pertence ao chamador e é passado explicitamente.

use crate::config::DecisionConfig;
use crate::types::{AlertClass, AlertDetail, AlertEvent, ConfirmedSign, SpeedLimit};
use std::time::{Duration, Instant};

/// Entradas de um tick.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput {
    pub map_limit: SpeedLimit,
    /// Velocidade já resolvida (telemetria, fallback ou manual)
    pub vehicle_speed_mph: f64,
    /// Placa confirmada neste tick, se houver
    pub confirmed_sign: Option<ConfirmedSign>,
}

/// Desde quando a condição de Overspeed está verdadeira.
#[derive(Debug, Clone, Default)]
pub struct OverspeedTracker {
    since: Option<Instant>,
}

impl OverspeedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Há quanto tempo a condição se mantém.
    pub fn held_for(&self, now: Instant) -> Option<Duration> {
        self.since.map(|t| now.saturating_duration_since(t))
    }

    pub fn reset(&mut self) {
        self.since = None;
    }
}

#[derive(Debug, Clone)]
pub struct DecisionEngine {
    temporary_gap_mph: f64,
    overspeed_tolerance_mph: f64,
    overspeed_grace: Duration,
}

impl DecisionEngine {
    pub fn new(config: &DecisionConfig) -> Self {
        Self {
            temporary_gap_mph: config.temporary_gap_mph,
            overspeed_tolerance_mph: config.overspeed_tolerance_mph,
            overspeed_grace: config.overspeed_grace(),
        }
    }

    /// Avalia as duas regras de forma independente; ambas podem disparar
    /// no mesmo tick.
    pub fn evaluate(
        &self,
        input: &DecisionInput,
        tracker: &mut OverspeedTracker,
        now: Instant,
    ) -> Vec<AlertEvent> {
        let mut events = Vec::with_capacity(2);

        if let Some(sign) = input.confirmed_sign {
            if self.is_temporary(sign.label, input.map_limit) {
                events.push(AlertEvent {
                    class: AlertClass::Temporary,
                    detail: AlertDetail {
                        map_limit: input.map_limit,
                        observed_mph: sign.label.mph(),
                    },
                    timestamp: now,
                });
            }
        }

        if self.is_over_limit(input.vehicle_speed_mph, input.map_limit) {
            let since = *tracker.since.get_or_insert(now);
            if now.saturating_duration_since(since) >= self.overspeed_grace {
                events.push(AlertEvent {
                    class: AlertClass::Overspeed,
                    detail: AlertDetail {
                        map_limit: input.map_limit,
                        observed_mph: input.vehicle_speed_mph,
                    },
                    timestamp: now,
                });
            }
        } else {
            tracker.reset();
        }

        events
    }

    /// Placa mais baixa que o mapa por pelo menos o gap configurado.
    pub fn is_temporary(&self, sign: SpeedLimit, map_limit: SpeedLimit) -> bool {
        sign.mph() <= map_limit.mph() - self.temporary_gap_mph
    }

    pub fn is_over_limit(&self, speed_mph: f64, map_limit: SpeedLimit) -> bool {
        speed_mph > map_limit.mph() + self.overspeed_tolerance_mph
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(gap: f64, grace_secs: f64) -> DecisionEngine {
        DecisionEngine::new(&DecisionConfig {
            temporary_gap_mph: gap,
            overspeed_tolerance_mph: 0.0,
            overspeed_grace_secs: grace_secs,
        })
    }

    fn sign(mph: u32) -> Option<ConfirmedSign> {
        Some(ConfirmedSign {
            label: SpeedLimit(mph),
            confirmed_at_frame: 0,
        })
    }

    fn input(map: u32, speed: f64, confirmed_sign: Option<ConfirmedSign>) -> DecisionInput {
        DecisionInput {
            map_limit: SpeedLimit(map),
            vehicle_speed_mph: speed,
            confirmed_sign,
        }
    }

    fn classes(events: &[AlertEvent]) -> Vec<AlertClass> {
        events.iter().map(|e| e.class).collect()
    }

    #[test]
    fn temporary_fires_for_sign_well_below_map() {
        let engine = engine(10.0, 1.0);
        let mut tracker = OverspeedTracker::new();
        let events = engine.evaluate(&input(50, 20.0, sign(30)), &mut tracker, Instant::now());
        assert_eq!(classes(&events), vec![AlertClass::Temporary]);
        assert_eq!(events[0].detail.map_limit, SpeedLimit(50));
        assert_eq!(events[0].detail.observed_mph, 30.0);
    }

    #[test]
    fn temporary_gap_boundary() {
        let engine = engine(10.0, 1.0);
        for (map, limit, expected) in [
            (50, 40, true),
            (50, 41, false),
            (50, 50, false),
            (50, 60, false),
            (30, 20, true),
            (20, 10, true),
            (20, 20, false),
        ] {
            assert_eq!(
                engine.is_temporary(SpeedLimit(limit), SpeedLimit(map)),
                expected,
                "map={map} sign={limit}"
            );
            let mut tracker = OverspeedTracker::new();
            let events = engine.evaluate(&input(map, 0.0, sign(limit)), &mut tracker, Instant::now());
            assert_eq!(events.len(), usize::from(expected), "map={map} sign={limit}");
        }
    }

    #[test]
    fn no_temporary_without_confirmed_sign() {
        let engine = engine(10.0, 1.0);
        let mut tracker = OverspeedTracker::new();
        let events = engine.evaluate(&input(50, 20.0, None), &mut tracker, Instant::now());
        assert!(events.is_empty());
    }

    #[test]
    fn overspeed_requires_sustained_grace() {
        let engine = engine(10.0, 1.0);
        let mut tracker = OverspeedTracker::new();
        let t0 = Instant::now();

        // 45 mph num limite de 40, ticks a cada 100 ms por 1.2 s
        let first_fire = (0..=12)
            .map(|i| t0 + Duration::from_millis(i * 100))
            .find(|&t| {
                let events = engine.evaluate(&input(40, 45.0, None), &mut tracker, t);
                events.iter().any(|e| e.class == AlertClass::Overspeed)
            });

        assert_eq!(first_fire, Some(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn dropping_under_limit_resets_grace_timer() {
        let engine = engine(10.0, 1.0);
        let mut tracker = OverspeedTracker::new();
        let t0 = Instant::now();

        assert!(engine.evaluate(&input(40, 45.0, None), &mut tracker, t0).is_empty());
        assert!(
            engine
                .evaluate(&input(40, 44.0, None), &mut tracker, t0 + Duration::from_millis(800))
                .is_empty()
        );
        // Exatamente no limite não conta como overspeed
        assert!(
            engine
                .evaluate(&input(40, 40.0, None), &mut tracker, t0 + Duration::from_millis(900))
                .is_empty()
        );
        assert!(tracker.held_for(t0 + Duration::from_millis(900)).is_none());

        // Volta acima: precisa de mais 1 s inteiro
        let t1 = t0 + Duration::from_millis(1000);
        assert!(engine.evaluate(&input(40, 45.0, None), &mut tracker, t1).is_empty());
        assert!(
            engine
                .evaluate(&input(40, 45.0, None), &mut tracker, t1 + Duration::from_millis(999))
                .is_empty()
        );
        let events = engine.evaluate(&input(40, 45.0, None), &mut tracker, t1 + Duration::from_secs(1));
        assert_eq!(classes(&events), vec![AlertClass::Overspeed]);
        assert_eq!(events[0].detail.observed_mph, 45.0);
    }

    #[test]
    fn zero_grace_fires_immediately() {
        let engine = engine(10.0, 0.0);
        let mut tracker = OverspeedTracker::new();
        let events = engine.evaluate(&input(30, 31.0, None), &mut tracker, Instant::now());
        assert_eq!(classes(&events), vec![AlertClass::Overspeed]);
    }

    #[test]
    fn both_rules_can_fire_in_same_tick() {
        let engine = engine(10.0, 0.0);
        let mut tracker = OverspeedTracker::new();
        let events = engine.evaluate(&input(50, 55.0, sign(30)), &mut tracker, Instant::now());
        assert_eq!(
            classes(&events),
            vec![AlertClass::Temporary, AlertClass::Overspeed]
        );
    }

    #[test]
    fn tolerance_raises_overspeed_threshold() {
        let engine = DecisionEngine::new(&DecisionConfig {
            overspeed_tolerance_mph: 2.0,
            overspeed_grace_secs: 0.0,
            ..Default::default()
        });
        assert!(!engine.is_over_limit(32.0, SpeedLimit(30)));
        assert!(engine.is_over_limit(32.5, SpeedLimit(30)));
    }
}
