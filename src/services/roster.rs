use std::collections::{HashMap, HashSet};
use std::future::Future;

use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    absence::AbsenceRequest,
    student::display_name,
    transport::{
        stop_time, BlockRider, BusChangeAdvisory, RiderView, RosterView, RouteBlock, StopView,
        TimeSlot,
    },
};

/// Read side of the roster. Injected into the assembler so tests can swap in
/// an in-memory fake for the Postgres implementation.
pub trait TransportStore: Send + Sync {
    fn find_slot(
        &self,
        slot_id: Uuid,
    ) -> impl Future<Output = anyhow::Result<Option<TimeSlot>>> + Send;

    /// Route blocks for (vehicle, slot), ordered by position.
    fn blocks_for(
        &self,
        vehicle_id: Uuid,
        slot_id: Uuid,
    ) -> impl Future<Output = anyhow::Result<Vec<RouteBlock>>> + Send;

    fn riders_for_blocks(
        &self,
        block_ids: &[Uuid],
    ) -> impl Future<Output = anyhow::Result<Vec<BlockRider>>> + Send;

    /// All pending absence requests, every kind. Date filtering happens in
    /// the assembler so the active-window rule lives in one place.
    fn pending_requests(&self) -> impl Future<Output = anyhow::Result<Vec<AbsenceRequest>>> + Send;
}

pub struct PgTransportStore {
    pool: PgPool,
}

impl PgTransportStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl TransportStore for PgTransportStore {
    async fn find_slot(&self, slot_id: Uuid) -> anyhow::Result<Option<TimeSlot>> {
        let slot = sqlx::query_as::<_, TimeSlot>("SELECT * FROM time_slots WHERE id = $1")
            .bind(slot_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(slot)
    }

    async fn blocks_for(&self, vehicle_id: Uuid, slot_id: Uuid) -> anyhow::Result<Vec<RouteBlock>> {
        let blocks = sqlx::query_as::<_, RouteBlock>(
            "SELECT * FROM route_blocks
             WHERE vehicle_id = $1 AND slot_id = $2
             ORDER BY position",
        )
        .bind(vehicle_id)
        .bind(slot_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(blocks)
    }

    async fn riders_for_blocks(&self, block_ids: &[Uuid]) -> anyhow::Result<Vec<BlockRider>> {
        let riders = sqlx::query_as::<_, BlockRider>(
            "SELECT bs.block_id, s.id AS student_id, s.native_name, s.english_name, s.contact_phone
             FROM block_students bs
             JOIN students s ON s.id = bs.student_id
             WHERE bs.block_id = ANY($1) AND s.is_active = TRUE
             ORDER BY s.native_name",
        )
        .bind(block_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(riders)
    }

    async fn pending_requests(&self) -> anyhow::Result<Vec<AbsenceRequest>> {
        let requests =
            sqlx::query_as::<_, AbsenceRequest>("SELECT * FROM absence_requests WHERE status = 'pending'")
                .fetch_all(&self.pool)
                .await?;
        Ok(requests)
    }
}

/// Builds the driver's stop-by-stop roster for a (vehicle, slot, date), net
/// of the day's excused students.
pub struct RosterAssembler<S> {
    store: S,
}

impl<S: TransportStore> RosterAssembler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// A missing slot or a (vehicle, slot) pair with no blocks is a valid
    /// "not operating today" state and yields an empty stop list.
    pub async fn assemble(
        &self,
        vehicle_id: Uuid,
        slot_id: Uuid,
        date: NaiveDate,
    ) -> anyhow::Result<RosterView> {
        let empty = RosterView {
            vehicle_id,
            slot_id,
            stops: Vec::new(),
            advisories: Vec::new(),
        };

        let slot = match self.store.find_slot(slot_id).await? {
            Some(s) => s,
            None => return Ok(empty),
        };

        let blocks = self.store.blocks_for(vehicle_id, slot_id).await?;
        if blocks.is_empty() {
            return Ok(empty);
        }

        let block_ids: Vec<Uuid> = blocks.iter().map(|b| b.id).collect();
        let riders = self.store.riders_for_blocks(&block_ids).await?;
        let requests = self.store.pending_requests().await?;

        let excused = excused_students(&requests, date);
        let stops = assemble_stops(&slot, &blocks, &riders, &excused);
        let rider_ids: HashSet<Uuid> = riders.iter().map(|r| r.student_id).collect();
        let advisories = bus_change_advisories(&requests, &rider_ids, date);

        Ok(RosterView {
            vehicle_id,
            slot_id,
            stops,
            advisories,
        })
    }
}

/// Students with a pending absence or early-pickup request active on `date`.
/// Both kinds exclude the whole day; bus changes never land here.
pub fn excused_students(requests: &[AbsenceRequest], date: NaiveDate) -> HashSet<Uuid> {
    requests
        .iter()
        .filter(|r| r.is_active_on(date))
        .filter(|r| r.kind().is_some_and(|k| k.excuses_from_roster()))
        .map(|r| r.student_id)
        .collect()
}

/// Bus-change requests active on `date` for students riding this route,
/// surfaced as advisories. Reporting only, the riders stay where they are.
pub fn bus_change_advisories(
    requests: &[AbsenceRequest],
    riders: &HashSet<Uuid>,
    date: NaiveDate,
) -> Vec<BusChangeAdvisory> {
    requests
        .iter()
        .filter(|r| riders.contains(&r.student_id))
        .filter(|r| r.is_active_on(date))
        .filter(|r| matches!(r.kind(), Some(crate::models::absence::AbsenceKind::BusChange)))
        .map(|r| BusChangeAdvisory {
            student_id: r.student_id,
            reason: r.advisory_reason(),
        })
        .collect()
}

/// Walks the blocks in position order, accumulating leg minutes onto the
/// slot departure and filtering each block's riders through the excusal set.
pub fn assemble_stops(
    slot: &TimeSlot,
    blocks: &[RouteBlock],
    riders: &[BlockRider],
    excused: &HashSet<Uuid>,
) -> Vec<StopView> {
    let mut by_block: HashMap<Uuid, Vec<RiderView>> = HashMap::new();
    for rider in riders {
        if excused.contains(&rider.student_id) {
            continue;
        }
        by_block.entry(rider.block_id).or_default().push(RiderView {
            student_id: rider.student_id,
            name: display_name(rider.english_name.as_deref(), &rider.native_name).to_string(),
            phone: rider.contact_phone.clone().unwrap_or_default(),
        });
    }

    let mut ordered: Vec<&RouteBlock> = blocks.iter().collect();
    ordered.sort_by_key(|b| b.position);

    let mut offset: i64 = 0;
    ordered
        .into_iter()
        .map(|block| {
            offset += i64::from(block.leg_minutes);
            StopView {
                block_id: block.id,
                label: block.label.clone(),
                time: stop_time(slot.departure, offset).format("%H:%M").to_string(),
                riders: by_block.remove(&block.id).unwrap_or_default(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::absence::AbsenceKind;
    use chrono::{NaiveTime, Utc};

    struct FakeTransportStore {
        slot: Option<TimeSlot>,
        blocks: Vec<RouteBlock>,
        riders: Vec<BlockRider>,
        requests: Vec<AbsenceRequest>,
    }

    impl TransportStore for FakeTransportStore {
        async fn find_slot(&self, _slot_id: Uuid) -> anyhow::Result<Option<TimeSlot>> {
            Ok(self.slot.clone())
        }

        async fn blocks_for(&self, _vehicle_id: Uuid, _slot_id: Uuid) -> anyhow::Result<Vec<RouteBlock>> {
            Ok(self.blocks.clone())
        }

        async fn riders_for_blocks(&self, _block_ids: &[Uuid]) -> anyhow::Result<Vec<BlockRider>> {
            Ok(self.riders.clone())
        }

        async fn pending_requests(&self) -> anyhow::Result<Vec<AbsenceRequest>> {
            Ok(self.requests.clone())
        }
    }

    fn slot(departure: &str) -> TimeSlot {
        TimeSlot {
            id: Uuid::new_v4(),
            direction: "pickup".into(),
            label: "Morning A".into(),
            departure: departure.parse::<NaiveTime>().unwrap(),
        }
    }

    fn block(slot: &TimeSlot, position: i32, leg_minutes: i32) -> RouteBlock {
        RouteBlock {
            id: Uuid::new_v4(),
            vehicle_id: Uuid::new_v4(),
            slot_id: slot.id,
            position,
            label: format!("Stop {position}"),
            leg_minutes,
        }
    }

    fn rider(block: &RouteBlock, name: &str) -> BlockRider {
        BlockRider {
            block_id: block.id,
            student_id: Uuid::new_v4(),
            native_name: name.into(),
            english_name: None,
            contact_phone: Some("010-1234".into()),
        }
    }

    fn pending(student_id: Uuid, kind: AbsenceKind, start: NaiveDate, end: Option<NaiveDate>) -> AbsenceRequest {
        AbsenceRequest {
            id: Uuid::new_v4(),
            student_id,
            kind: kind.to_string(),
            date_start: start,
            date_end: end,
            pickup_time: None,
            change_type: Some("to route B".into()),
            note: None,
            status: "pending".into(),
            created_by: None,
            created_at: Utc::now(),
        }
    }

    fn today() -> NaiveDate {
        "2026-03-02".parse().unwrap()
    }

    #[test]
    fn stop_times_accumulate_leg_minutes() {
        let s = slot("08:00:00");
        let blocks = vec![block(&s, 1, 5), block(&s, 2, 10), block(&s, 3, 0)];
        let stops = assemble_stops(&s, &blocks, &[], &HashSet::new());
        let times: Vec<&str> = stops.iter().map(|st| st.time.as_str()).collect();
        assert_eq!(times, vec!["08:05", "08:15", "08:15"]);
    }

    #[test]
    fn stops_follow_position_order_even_when_input_is_shuffled() {
        let s = slot("07:30:00");
        let blocks = vec![block(&s, 3, 4), block(&s, 1, 5), block(&s, 2, 10)];
        let stops = assemble_stops(&s, &blocks, &[], &HashSet::new());
        let labels: Vec<&str> = stops.iter().map(|st| st.label.as_str()).collect();
        assert_eq!(labels, vec!["Stop 1", "Stop 2", "Stop 3"]);
        assert_eq!(stops.last().unwrap().time, "07:49");
    }

    #[test]
    fn late_slot_wraps_hour_of_day() {
        let s = slot("23:50:00");
        let blocks = vec![block(&s, 1, 20)];
        let stops = assemble_stops(&s, &blocks, &[], &HashSet::new());
        assert_eq!(stops[0].time, "00:10");
    }

    #[tokio::test]
    async fn excused_student_rides_no_stop() {
        let s = slot("08:00:00");
        let b1 = block(&s, 1, 5);
        let b2 = block(&s, 2, 5);
        let stays = rider(&b1, "김하은");
        let excused_rider = rider(&b2, "이준서");

        let store = FakeTransportStore {
            slot: Some(s.clone()),
            blocks: vec![b1, b2],
            requests: vec![pending(
                excused_rider.student_id,
                AbsenceKind::EarlyPickup,
                today(),
                None,
            )],
            riders: vec![stays.clone(), excused_rider.clone()],
        };

        let assembler = RosterAssembler::new(store);
        let roster = assembler.assemble(Uuid::new_v4(), s.id, today()).await.unwrap();

        let all_riders: Vec<Uuid> = roster
            .stops
            .iter()
            .flat_map(|st| st.riders.iter().map(|r| r.student_id))
            .collect();
        assert!(all_riders.contains(&stays.student_id));
        assert!(!all_riders.contains(&excused_rider.student_id));
    }

    #[tokio::test]
    async fn open_ended_excusal_applies_to_its_start_date_only() {
        let s = slot("08:00:00");
        let b = block(&s, 1, 5);
        let r = rider(&b, "김하은");
        let store = FakeTransportStore {
            slot: Some(s.clone()),
            blocks: vec![b],
            requests: vec![pending(r.student_id, AbsenceKind::EarlyPickup, today(), None)],
            riders: vec![r.clone()],
        };
        let assembler = RosterAssembler::new(store);

        let today_view = assembler.assemble(Uuid::new_v4(), s.id, today()).await.unwrap();
        assert!(today_view.stops[0].riders.is_empty());

        let tomorrow = today().succ_opt().unwrap();
        let tomorrow_view = assembler.assemble(Uuid::new_v4(), s.id, tomorrow).await.unwrap();
        assert_eq!(tomorrow_view.stops[0].riders.len(), 1);
    }

    #[tokio::test]
    async fn bus_change_is_advisory_not_exclusion() {
        let s = slot("08:00:00");
        let b = block(&s, 1, 5);
        let r = rider(&b, "김하은");
        let store = FakeTransportStore {
            slot: Some(s.clone()),
            blocks: vec![b],
            requests: vec![pending(r.student_id, AbsenceKind::BusChange, today(), None)],
            riders: vec![r.clone()],
        };

        let roster = RosterAssembler::new(store)
            .assemble(Uuid::new_v4(), s.id, today())
            .await
            .unwrap();

        assert_eq!(roster.stops[0].riders.len(), 1);
        assert_eq!(roster.advisories.len(), 1);
        assert_eq!(roster.advisories[0].student_id, r.student_id);
        assert_eq!(roster.advisories[0].reason, "to route B");
    }

    #[tokio::test]
    async fn advisories_cover_only_this_routes_riders() {
        let s = slot("08:00:00");
        let b = block(&s, 1, 5);
        let r = rider(&b, "김하은");
        let other_route_student = Uuid::new_v4();
        let store = FakeTransportStore {
            slot: Some(s.clone()),
            blocks: vec![b],
            riders: vec![r.clone()],
            requests: vec![
                pending(r.student_id, AbsenceKind::BusChange, today(), None),
                pending(other_route_student, AbsenceKind::BusChange, today(), None),
            ],
        };

        let roster = RosterAssembler::new(store)
            .assemble(Uuid::new_v4(), s.id, today())
            .await
            .unwrap();

        assert_eq!(roster.advisories.len(), 1);
        assert_eq!(roster.advisories[0].student_id, r.student_id);
    }

    #[tokio::test]
    async fn no_route_for_vehicle_and_slot_is_empty_not_error() {
        let s = slot("08:00:00");
        let store = FakeTransportStore {
            slot: Some(s.clone()),
            blocks: vec![],
            riders: vec![],
            requests: vec![],
        };
        let roster = RosterAssembler::new(store)
            .assemble(Uuid::new_v4(), s.id, today())
            .await
            .unwrap();
        assert!(roster.stops.is_empty());
        assert!(roster.advisories.is_empty());
    }

    #[tokio::test]
    async fn rider_names_prefer_english_and_phone_defaults_empty() {
        let s = slot("08:00:00");
        let b = block(&s, 1, 0);
        let mut named = rider(&b, "김하은");
        named.english_name = Some("Amy".into());
        let mut unnamed = rider(&b, "");
        unnamed.contact_phone = None;

        let store = FakeTransportStore {
            slot: Some(s.clone()),
            blocks: vec![b],
            riders: vec![named, unnamed],
            requests: vec![],
        };
        let roster = RosterAssembler::new(store)
            .assemble(Uuid::new_v4(), s.id, today())
            .await
            .unwrap();

        let names: Vec<&str> = roster.stops[0].riders.iter().map(|r| r.name.as_str()).collect();
        assert!(names.contains(&"Amy"));
        assert!(names.contains(&"unknown"));
        let unnamed_view = roster.stops[0]
            .riders
            .iter()
            .find(|r| r.name == "unknown")
            .unwrap();
        assert_eq!(unnamed_view.phone, "");
    }
}
