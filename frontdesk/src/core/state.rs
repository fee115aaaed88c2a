use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use shared::cloud::{SyncState, SyncStatus};
use shared::models::{
    ActivityEntry, Extra, Housekeeping, Payment, ProfileTable, Reminder, Reservation, Room,
    StayStatus,
};
use std::sync::Arc;
use tokio::sync::watch;

use crate::cache::LocalCache;
use crate::core::Config;
use crate::reservations::portal::{self, PortalGrant};
use crate::reservations::{
    BillingSummary, FlatStay, PortalAccess, ReservationDraft, ReservationStore, RoomRegistry,
    StoreError, StoreResult,
};
use crate::sync::{RemoteSyncClient, RemoteTransport, RestTransport};
use crate::utils::{AppError, AppResult};

/// Attempts to attach a freshly allocated portal code before giving up
const PORTAL_ATTACH_ATTEMPTS: usize = 3;

/// 前台会话 - 持有会话内所有组件
///
/// 会话开始时构造，登出时调用 [`FrontDesk::close`]。
/// 使用 Arc 实现浅拷贝，可在任务间共享。
///
/// # 组件
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 配置项 (不可变) |
/// | store | 预订存储，唯一写入者 |
/// | cache | 本地缓存 (redb) |
/// | rooms | 房间注册表 (只读) |
/// | sync | 远端同步客户端 |
///
/// 所有写操作先同步落地本地，再以防抖方式异步推送远端。
/// 写操作需在 tokio 运行时内调用，否则远端推送会被跳过。
#[derive(Clone)]
pub struct FrontDesk {
    pub config: Config,
    store: Arc<ReservationStore>,
    cache: LocalCache,
    rooms: Arc<dyn RoomRegistry>,
    sync: RemoteSyncClient,
}

impl std::fmt::Debug for FrontDesk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrontDesk")
            .field("store", &self.store)
            .field("sync", &self.sync)
            .finish_non_exhaustive()
    }
}

impl FrontDesk {
    /// 打开会话：本地缓存位于工作目录，远端由配置决定
    pub fn open(config: Config, rooms: Arc<dyn RoomRegistry>) -> AppResult<Self> {
        std::fs::create_dir_all(&config.work_dir).map_err(|e| {
            AppError::internal(format!("Failed to create work dir {}: {e}", config.work_dir))
        })?;
        let cache = LocalCache::open(config.cache_path())?;

        let sync = match &config.sync.base_url {
            Some(url) => {
                let transport = RestTransport::new(url.clone(), &config.sync)?;
                RemoteSyncClient::new(Arc::new(transport), config.sync.clone())
            }
            None => {
                tracing::info!("SYNC_BASE_URL not set, session runs offline");
                RemoteSyncClient::offline(config.sync.clone())
            }
        };

        Ok(Self::assemble(config, cache, rooms, sync))
    }

    /// 使用注入的缓存和传输层打开会话 (测试场景)
    pub fn open_with(
        config: Config,
        cache: LocalCache,
        rooms: Arc<dyn RoomRegistry>,
        transport: Arc<dyn RemoteTransport>,
    ) -> Self {
        let sync = RemoteSyncClient::new(transport, config.sync.clone());
        Self::assemble(config, cache, rooms, sync)
    }

    fn assemble(
        config: Config,
        cache: LocalCache,
        rooms: Arc<dyn RoomRegistry>,
        sync: RemoteSyncClient,
    ) -> Self {
        let store = Arc::new(ReservationStore::open(
            cache.clone(),
            config.booking_ref_prefix.clone(),
        ));
        tracing::info!(
            reservations = store.len(),
            rooms = rooms.all_rooms().len(),
            "Front desk session opened"
        );
        Self {
            config,
            store,
            cache,
            rooms,
            sync,
        }
    }

    pub fn store(&self) -> &Arc<ReservationStore> {
        &self.store
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn sync(&self) -> &RemoteSyncClient {
        &self.sync
    }

    /// Rooms must exist in the registry; an empty registry accepts any room
    fn check_rooms_known(&self, reservation_rooms: &[shared::RoomStay]) -> StoreResult<()> {
        if self.rooms.all_rooms().is_empty() {
            return Ok(());
        }
        match reservation_rooms
            .iter()
            .find(|s| self.rooms.room_type(&s.room_number).is_none())
        {
            Some(stay) => Err(StoreError::validation(format!(
                "unknown room {}",
                stay.room_number
            ))),
            None => Ok(()),
        }
    }

    fn schedule_push(&self, reservation: &Reservation) {
        self.sync
            .schedule_reservation(Arc::clone(&self.store), &reservation.booking_ref);
    }

    // ========== 预订写操作 ==========

    /// 创建预订 (区块草稿按房间拆分)
    pub fn create_reservation(&self, draft: ReservationDraft) -> AppResult<Vec<Reservation>> {
        self.check_rooms_known(&draft.rooms)?;
        let created = self.store.create(draft)?;
        for reservation in &created {
            self.schedule_push(reservation);
        }
        Ok(created)
    }

    /// 修改预订；日期、房间或占用状态变化时重新校验冲突
    pub fn update_reservation<F>(&self, id: u64, mutator: F) -> AppResult<Reservation>
    where
        F: FnOnce(&mut Reservation) -> StoreResult<()>,
    {
        let updated = self.store.update(id, |r| {
            mutator(r)?;
            self.check_rooms_known(&r.rooms)
        })?;
        self.schedule_push(&updated);
        Ok(updated)
    }

    /// 记录付款 (负数为退款)
    pub fn add_payment(
        &self,
        id: u64,
        amount: f64,
        method: impl Into<String>,
        note: Option<String>,
    ) -> AppResult<Payment> {
        if !amount.is_finite() || amount == 0.0 {
            return Err(AppError::validation("payment amount must be a non-zero number"));
        }
        let method = method.into();
        let mut added = None;
        self.update_reservation(id, |r| {
            let payment = Payment {
                id: r.next_entry_id(),
                amount,
                method,
                timestamp: shared::util::now_millis(),
                note,
            };
            r.payments.push(payment.clone());
            added = Some(payment);
            Ok(())
        })?;
        added.ok_or_else(|| AppError::internal("payment was not recorded"))
    }

    /// 添加附加消费
    pub fn add_extra(
        &self,
        id: u64,
        description: impl Into<String>,
        quantity: u32,
        unit_price: f64,
        date: NaiveDate,
        room_number: Option<String>,
    ) -> AppResult<Extra> {
        if quantity == 0 || !unit_price.is_finite() {
            return Err(AppError::validation("extra needs a quantity and a price"));
        }
        let description = description.into();
        let mut added = None;
        self.update_reservation(id, |r| {
            if let Some(room) = &room_number
                && !r.rooms.iter().any(|s| &s.room_number == room)
            {
                return Err(StoreError::validation(format!(
                    "room {room} is not part of {}",
                    r.booking_ref
                )));
            }
            let extra = Extra {
                id: r.next_entry_id(),
                description,
                quantity,
                unit_price,
                date,
                room_number,
            };
            r.extras.push(extra.clone());
            added = Some(extra);
            Ok(())
        })?;
        added.ok_or_else(|| AppError::internal("extra was not recorded"))
    }

    pub fn set_housekeeping(
        &self,
        id: u64,
        room_index: usize,
        housekeeping: Housekeeping,
    ) -> AppResult<Reservation> {
        self.update_reservation(id, |r| {
            room_mut(r, room_index)?.housekeeping = housekeeping;
            Ok(())
        })
    }

    /// 修改单个房间状态 (入住 / 退房 / 取消 / 未到)
    ///
    /// 从取消或未到恢复为占用状态时会重新校验冲突。
    pub fn set_room_status(
        &self,
        id: u64,
        room_index: usize,
        status: StayStatus,
        actor: &str,
    ) -> AppResult<Reservation> {
        let updated = self.update_reservation(id, |r| {
            let stay = room_mut(r, room_index)?;
            let previous = stay.status;
            if previous == status {
                return Ok(());
            }
            stay.status = status;
            let message = format!("Room {}: {previous} → {status}", stay.room_number);
            r.activity_log.push(ActivityEntry {
                timestamp: shared::util::now_millis(),
                actor: actor.to_string(),
                message,
            });
            Ok(())
        })?;
        tracing::info!(
            booking_ref = %updated.booking_ref,
            room_index,
            status = %status,
            "Room status changed"
        );
        Ok(updated)
    }

    pub fn add_reminder(&self, id: u64, due_at: i64, message: impl Into<String>) -> AppResult<Reminder> {
        let message = message.into();
        let mut added = None;
        self.update_reservation(id, |r| {
            let reminder = Reminder {
                id: r.next_entry_id(),
                due_at,
                message,
                fired: false,
            };
            r.reminders.push(reminder.clone());
            added = Some(reminder);
            Ok(())
        })?;
        added.ok_or_else(|| AppError::internal("reminder was not recorded"))
    }

    /// 标记提醒已触发 (提醒唯一可变的字段)
    pub fn mark_reminder_fired(&self, id: u64, reminder_id: u64) -> AppResult<Reservation> {
        self.update_reservation(id, |r| {
            let reminder = r
                .reminders
                .iter_mut()
                .find(|m| m.id == reminder_id)
                .ok_or_else(|| StoreError::validation(format!("unknown reminder {reminder_id}")))?;
            reminder.fired = true;
            Ok(())
        })
    }

    pub fn log_activity(
        &self,
        id: u64,
        actor: impl Into<String>,
        message: impl Into<String>,
    ) -> AppResult<Reservation> {
        let entry = ActivityEntry {
            timestamp: shared::util::now_millis(),
            actor: actor.into(),
            message: message.into(),
        };
        self.update_reservation(id, |r| {
            r.activity_log.push(entry);
            Ok(())
        })
    }

    // ========== 门户码 ==========

    /// 为房间分配门户码并写回预订
    ///
    /// 已离店超过有效期的房间不再发码。已有门户码会被替换。
    pub fn issue_portal_code(
        &self,
        id: u64,
        room_index: usize,
        now: DateTime<Utc>,
    ) -> AppResult<PortalGrant> {
        let reservation = self
            .store
            .get(id)
            .ok_or_else(|| AppError::not_found(format!("reservation {id}")))?;
        let stay = reservation
            .rooms
            .get(room_index)
            .ok_or_else(|| AppError::validation(format!("room index {room_index} out of range")))?;
        if !stay.status.occupies_room() {
            return Err(AppError::validation(format!(
                "room {} is {}, no portal access",
                stay.room_number, stay.status
            )));
        }
        let (_, valid_until) = portal::validity_window(stay.checkin, stay.checkout);
        if now > valid_until {
            return Err(AppError::validation(format!(
                "stay in room {} has ended",
                stay.room_number
            )));
        }

        let guest_name = stay
            .guest_name
            .clone()
            .unwrap_or_else(|| reservation.booker.name.clone());
        let (checkin, checkout) = (stay.checkin, stay.checkout);

        let mut last_err = None;
        for _ in 0..PORTAL_ATTACH_ATTEMPTS {
            let taken = self.store.portal_codes();
            let grant = portal::allocate(
                &guest_name,
                checkin,
                checkout,
                &taken,
                &mut rand::thread_rng(),
            )?;
            let attached = self.update_reservation(id, |r| {
                let stay = room_mut(r, room_index)?;
                stay.guest_portal_code = Some(grant.code.clone());
                stay.portal_code_valid_from = Some(grant.valid_from);
                stay.portal_code_valid_until = Some(grant.valid_until);
                Ok(())
            });
            match attached {
                Ok(_) => {
                    tracing::info!(booking_ref = %reservation.booking_ref, room_index, "Portal code issued");
                    return Ok(grant);
                }
                // Taken concurrently between allocation and attach
                Err(AppError::DuplicatePortalCode(code)) => {
                    tracing::debug!(code = %code, "Portal code raced, reallocating");
                    last_err = Some(AppError::DuplicatePortalCode(code));
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| AppError::internal("portal code allocation failed")))
    }

    /// 按门户码查找房间；超出有效期或房间已取消 / 未到时视为无效
    pub fn lookup_portal_code(&self, code: &str, at: DateTime<Utc>) -> Option<PortalAccess> {
        self.store.find_by_portal_code(code, at)
    }

    // ========== 配置与档案 ==========

    pub fn set_config(&self, key: &str, value: Value) -> AppResult<()> {
        self.cache.put_config(key, &value)?;
        self.sync.schedule_config(self.cache.clone(), key);
        Ok(())
    }

    pub fn get_config(&self, key: &str) -> AppResult<Option<Value>> {
        Ok(self.cache.get_config(key)?)
    }

    /// 保存档案，未指定 id 时生成 UUID；返回档案 id
    pub fn save_profile(
        &self,
        table: ProfileTable,
        id: Option<&str>,
        data: Value,
    ) -> AppResult<String> {
        let id = match id.map(str::trim) {
            Some("") => return Err(AppError::validation("profile id must not be blank")),
            Some(id) => id.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };
        self.cache.put_profile(table, &id, &data)?;
        self.sync.schedule_profiles(self.cache.clone(), table);
        Ok(id)
    }

    // ========== 查询 ==========

    pub fn reservation(&self, id: u64) -> Option<Reservation> {
        self.store.get(id)
    }

    pub fn reservation_by_ref(&self, booking_ref: &str) -> Option<Reservation> {
        self.store.get_by_ref(booking_ref)
    }

    pub fn reservations(&self) -> Vec<Reservation> {
        self.store.all()
    }

    pub fn flatten(&self) -> Vec<FlatStay> {
        self.store.flatten()
    }

    pub fn is_room_available(&self, room: &str, from: NaiveDate, to: NaiveDate) -> bool {
        self.store
            .is_room_available(room, from, to, &StayStatus::RELEASED)
    }

    pub fn available_rooms(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        room_type: Option<&str>,
    ) -> Vec<Room> {
        self.store
            .available_rooms(self.rooms.as_ref(), from, to, room_type)
    }

    pub fn stays_on(&self, date: NaiveDate) -> Vec<FlatStay> {
        self.store.stays_on(date)
    }

    pub fn arrivals_on(&self, date: NaiveDate) -> Vec<FlatStay> {
        self.store.arrivals_on(date)
    }

    pub fn departures_on(&self, date: NaiveDate) -> Vec<FlatStay> {
        self.store.departures_on(date)
    }

    pub fn billing_summary(&self, id: u64) -> AppResult<BillingSummary> {
        self.store
            .billing_summary(id)
            .ok_or_else(|| AppError::not_found(format!("reservation {id}")))
    }

    // ========== 同步 ==========

    /// 防抖后全量推送所有预订
    pub fn resync_all(&self) {
        self.sync.schedule_full_push(Arc::clone(&self.store));
    }

    /// 启动同步：探测远端并按顺序推送本地数据
    pub async fn start_sync(&self) -> SyncStatus {
        self.sync.startup(&self.store, &self.cache).await
    }

    /// 订阅同步状态
    pub fn sync_status(&self) -> watch::Receiver<SyncState> {
        self.sync.subscribe()
    }

    /// 结束会话：立即执行所有待推送操作，并等待进行中的推送完成
    pub async fn close(&self) {
        self.sync.flush().await;
        tracing::info!("Front desk session closed");
    }
}

fn room_mut(reservation: &mut Reservation, room_index: usize) -> StoreResult<&mut shared::RoomStay> {
    reservation
        .rooms
        .get_mut(room_index)
        .ok_or_else(|| StoreError::validation(format!("room index {room_index} out of range")))
}
