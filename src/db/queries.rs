use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    ApprovalStage, Booking, BookingNames, BookingPolicy, BookingStats, BookingView, Role, Session,
    StageChange, StageHistoryEntry, Usage, User, Visibility,
};

pub const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M";

fn fmt_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FMT).to_string()
}

fn parse_datetime(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FMT)
        .with_context(|| format!("invalid timestamp in database: {s}"))
}

fn parse_opt_datetime(s: Option<String>) -> anyhow::Result<Option<NaiveDateTime>> {
    s.as_deref().map(parse_datetime).transpose()
}

fn parse_time(s: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(s, TIME_FMT).with_context(|| format!("invalid time in database: {s}"))
}

/// SQL list of the stages that no longer hold a slot, e.g. `'REJECTED', 'CANCELLED'`.
fn released_stages() -> String {
    ApprovalStage::ALL
        .iter()
        .filter(|stage| !stage.holds_slot())
        .map(|stage| format!("'{}'", stage.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Users ──

pub fn insert_user(conn: &Connection, user: &User) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO users (id, name, email, password_hash, role, advisor_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user.id,
            user.name,
            user.email,
            user.password_hash,
            user.role.as_str(),
            user.advisor_id,
            fmt_datetime(&user.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_user_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<User>> {
    let row = conn
        .query_row(
            "SELECT id, name, email, password_hash, role, advisor_id, created_at
             FROM users WHERE id = ?1",
            params![id],
            |row| Ok(parse_user_row(row)),
        )
        .optional()?;
    row.transpose()
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> anyhow::Result<Option<User>> {
    let row = conn
        .query_row(
            "SELECT id, name, email, password_hash, role, advisor_id, created_at
             FROM users WHERE email = ?1",
            params![email],
            |row| Ok(parse_user_row(row)),
        )
        .optional()?;
    row.transpose()
}

fn parse_user_row(row: &rusqlite::Row) -> anyhow::Result<User> {
    let role_str: String = row.get(4)?;
    let created_at_str: String = row.get(6)?;

    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: Role::parse(&role_str)
            .with_context(|| format!("unknown role in database: {role_str}"))?,
        advisor_id: row.get(5)?,
        created_at: parse_datetime(&created_at_str)?,
    })
}

// ── Sessions ──

pub fn insert_session(conn: &Connection, session: &Session) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            session.id,
            session.user_id,
            fmt_datetime(&session.created_at),
            fmt_datetime(&session.expires_at),
        ],
    )?;
    Ok(())
}

/// Only sessions that have not yet expired at `now` are returned.
pub fn get_live_session(
    conn: &Connection,
    id: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<Option<Session>> {
    let row = conn
        .query_row(
            "SELECT id, user_id, created_at, expires_at FROM sessions
             WHERE id = ?1 AND expires_at > ?2",
            params![id, fmt_datetime(now)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    match row {
        Some((id, user_id, created_at, expires_at)) => Ok(Some(Session {
            id,
            user_id,
            created_at: parse_datetime(&created_at)?,
            expires_at: parse_datetime(&expires_at)?,
        })),
        None => Ok(None),
    }
}

pub fn delete_session(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

pub fn expire_old_sessions(conn: &Connection, now: &NaiveDateTime) -> anyhow::Result<usize> {
    let count = conn.execute(
        "DELETE FROM sessions WHERE expires_at <= ?1",
        params![fmt_datetime(now)],
    )?;
    Ok(count)
}

// ── Bookings ──

const BOOKING_SELECT: &str = "SELECT b.id, b.user_id, b.resource_id, b.booking_date, b.start_time, b.end_time,
        b.duration_hours, b.approval_stage, b.visibility, b.staff_approved_by, b.staff_approved_at,
        b.admin_approved_by, b.admin_approved_at, b.created_at, b.updated_at,
        u.name, s.name, a.name
     FROM bookings b
     LEFT JOIN users u ON u.id = b.user_id
     LEFT JOIN users s ON s.id = b.staff_approved_by
     LEFT JOIN users a ON a.id = b.admin_approved_by";

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, user_id, resource_id, booking_date, start_time, end_time, duration_hours,
            approval_stage, visibility, staff_approved_by, staff_approved_at, admin_approved_by, admin_approved_at,
            created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            booking.id,
            booking.user_id,
            booking.resource_id,
            booking.booking_date.format(DATE_FMT).to_string(),
            booking.start_time.format(TIME_FMT).to_string(),
            booking.end_time.format(TIME_FMT).to_string(),
            booking.duration_hours,
            booking.approval_stage.as_str(),
            booking.visibility.as_str(),
            booking.staff_approved_by,
            booking.staff_approved_at.as_ref().map(fmt_datetime),
            booking.admin_approved_by,
            booking.admin_approved_at.as_ref().map(fmt_datetime),
            fmt_datetime(&booking.created_at),
            fmt_datetime(&booking.updated_at),
        ],
    )?;
    Ok(())
}

/// Writes the approval columns; scheduling attributes are never updated.
pub fn update_approval(conn: &Connection, booking: &Booking) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET approval_stage = ?1, visibility = ?2, staff_approved_by = ?3,
            staff_approved_at = ?4, admin_approved_by = ?5, admin_approved_at = ?6, updated_at = ?7
         WHERE id = ?8",
        params![
            booking.approval_stage.as_str(),
            booking.visibility.as_str(),
            booking.staff_approved_by,
            booking.staff_approved_at.as_ref().map(fmt_datetime),
            booking.admin_approved_by,
            booking.admin_approved_at.as_ref().map(fmt_datetime),
            fmt_datetime(&booking.updated_at),
            booking.id,
        ],
    )?;
    Ok(count > 0)
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    Ok(get_booking_with_names(conn, id)?.map(|(booking, _)| booking))
}

pub fn get_booking_view(conn: &Connection, id: &str) -> anyhow::Result<Option<BookingView>> {
    Ok(get_booking_with_names(conn, id)?.map(|(booking, names)| BookingView::new(&booking, names)))
}

fn get_booking_with_names(
    conn: &Connection,
    id: &str,
) -> anyhow::Result<Option<(Booking, BookingNames)>> {
    let sql = format!("{BOOKING_SELECT} WHERE b.id = ?1");
    let row = conn
        .query_row(&sql, params![id], |row| Ok(parse_booking_row(row)))
        .optional()?;
    row.transpose()
}

pub fn get_bookings_for_user(conn: &Connection, user_id: &str) -> anyhow::Result<Vec<BookingView>> {
    let sql = format!("{BOOKING_SELECT} WHERE b.user_id = ?1 ORDER BY b.created_at DESC, b.rowid DESC");
    query_booking_views(conn, &sql, params![user_id])
}

pub fn get_all_bookings(conn: &Connection) -> anyhow::Result<Vec<BookingView>> {
    let sql = format!("{BOOKING_SELECT} ORDER BY b.created_at DESC, b.rowid DESC");
    query_booking_views(conn, &sql, params![])
}

pub fn get_bookings_by_stage(
    conn: &Connection,
    stage: ApprovalStage,
) -> anyhow::Result<Vec<BookingView>> {
    let sql = format!(
        "{BOOKING_SELECT} WHERE b.approval_stage = ?1 ORDER BY b.created_at DESC, b.rowid DESC"
    );
    query_booking_views(conn, &sql, params![stage.as_str()])
}

pub fn get_advisee_bookings_by_stage(
    conn: &Connection,
    advisor_id: &str,
    stage: ApprovalStage,
) -> anyhow::Result<Vec<BookingView>> {
    let sql = format!(
        "{BOOKING_SELECT} WHERE b.approval_stage = ?1 AND u.advisor_id = ?2
         ORDER BY b.created_at DESC, b.rowid DESC"
    );
    query_booking_views(conn, &sql, params![stage.as_str(), advisor_id])
}

pub fn get_advisee_bookings(conn: &Connection, advisor_id: &str) -> anyhow::Result<Vec<BookingView>> {
    let sql = format!(
        "{BOOKING_SELECT} WHERE u.advisor_id = ?1 ORDER BY b.created_at DESC, b.rowid DESC"
    );
    query_booking_views(conn, &sql, params![advisor_id])
}

fn query_booking_views(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> anyhow::Result<Vec<BookingView>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        let (booking, names) = row??;
        bookings.push(BookingView::new(&booking, names));
    }
    Ok(bookings)
}

/// True when another booking for the resource still holds an overlapping
/// slot on that date.
pub fn has_overlapping_booking(
    conn: &Connection,
    resource_id: &str,
    date: &NaiveDate,
    start: &NaiveTime,
    end: &NaiveTime,
) -> anyhow::Result<bool> {
    let sql = format!(
        "SELECT COUNT(*) FROM bookings
         WHERE resource_id = ?1 AND booking_date = ?2
           AND start_time < ?3 AND end_time > ?4
           AND approval_stage NOT IN ({})",
        released_stages()
    );
    let count: i64 = conn.query_row(
        &sql,
        params![
            resource_id,
            date.format(DATE_FMT).to_string(),
            end.format(TIME_FMT).to_string(),
            start.format(TIME_FMT).to_string(),
        ],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Time ranges still held on `resource_id` for `date`, earliest first.
pub fn get_held_slots(
    conn: &Connection,
    resource_id: &str,
    date: &NaiveDate,
) -> anyhow::Result<Vec<(NaiveTime, NaiveTime)>> {
    let sql = format!(
        "SELECT start_time, end_time FROM bookings
         WHERE resource_id = ?1 AND booking_date = ?2
           AND approval_stage NOT IN ({})
         ORDER BY start_time ASC",
        released_stages()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![resource_id, date.format(DATE_FMT).to_string()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut held = vec![];
    for row in rows {
        let (start, end) = row?;
        held.push((parse_time(&start)?, parse_time(&end)?));
    }
    Ok(held)
}

pub fn get_advisee_stats(conn: &Connection, advisor_id: &str) -> anyhow::Result<BookingStats> {
    let mut stmt = conn.prepare(
        "SELECT b.approval_stage, COUNT(*) FROM bookings b
         JOIN users u ON u.id = b.user_id
         WHERE u.advisor_id = ?1
         GROUP BY b.approval_stage",
    )?;
    let rows = stmt.query_map(params![advisor_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut stats = BookingStats::default();
    for row in rows {
        let (stage, count) = row?;
        stats.total_bookings += count;
        match ApprovalStage::parse(&stage) {
            Some(ApprovalStage::PendingStaff | ApprovalStage::PendingAdmin) => {
                stats.pending_bookings += count
            }
            Some(ApprovalStage::Approved | ApprovalStage::ApprovedStaffOnly) => {
                stats.approved_bookings += count
            }
            Some(ApprovalStage::Rejected) => stats.rejected_bookings += count,
            _ => {}
        }
    }
    Ok(stats)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<(Booking, BookingNames)> {
    let booking_date_str: String = row.get(3)?;
    let start_time_str: String = row.get(4)?;
    let end_time_str: String = row.get(5)?;
    let stage_str: String = row.get(7)?;
    let visibility_str: String = row.get(8)?;
    let created_at_str: String = row.get(13)?;
    let updated_at_str: String = row.get(14)?;

    let booking = Booking {
        id: row.get(0)?,
        user_id: row.get(1)?,
        resource_id: row.get(2)?,
        booking_date: NaiveDate::parse_from_str(&booking_date_str, DATE_FMT)
            .with_context(|| format!("invalid booking date in database: {booking_date_str}"))?,
        start_time: NaiveTime::parse_from_str(&start_time_str, TIME_FMT)
            .with_context(|| format!("invalid start time in database: {start_time_str}"))?,
        end_time: NaiveTime::parse_from_str(&end_time_str, TIME_FMT)
            .with_context(|| format!("invalid end time in database: {end_time_str}"))?,
        duration_hours: row.get(6)?,
        approval_stage: ApprovalStage::parse(&stage_str)
            .with_context(|| format!("unknown approval stage in database: {stage_str}"))?,
        visibility: Visibility::parse(&visibility_str),
        staff_approved_by: row.get(9)?,
        staff_approved_at: parse_opt_datetime(row.get(10)?)?,
        admin_approved_by: row.get(11)?,
        admin_approved_at: parse_opt_datetime(row.get(12)?)?,
        created_at: parse_datetime(&created_at_str)?,
        updated_at: parse_datetime(&updated_at_str)?,
    };

    let names = BookingNames {
        user_name: row.get(15)?,
        staff_approved_by_name: row.get(16)?,
        admin_approved_by_name: row.get(17)?,
    };

    Ok((booking, names))
}

// ── Policies ──

pub fn get_policy(conn: &Connection, role: Role) -> anyhow::Result<Option<BookingPolicy>> {
    let policy = conn
        .query_row(
            "SELECT max_bookings_per_day, max_bookings_per_month,
                    max_hours_per_day, max_hours_per_month, is_unlimited
             FROM booking_policies WHERE role = ?1",
            params![role.as_str()],
            |row| {
                Ok(BookingPolicy {
                    role,
                    max_bookings_per_day: row.get(0)?,
                    max_bookings_per_month: row.get(1)?,
                    max_hours_per_day: row.get(2)?,
                    max_hours_per_month: row.get(3)?,
                    is_unlimited: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(policy)
}

/// Bookings of `user_id` dated `from..=to` that still hold their slot.
pub fn get_usage(
    conn: &Connection,
    user_id: &str,
    from: &NaiveDate,
    to: &NaiveDate,
) -> anyhow::Result<Usage> {
    let sql = format!(
        "SELECT COUNT(*), COALESCE(SUM(duration_hours), 0) FROM bookings
         WHERE user_id = ?1 AND booking_date BETWEEN ?2 AND ?3
           AND approval_stage NOT IN ({})",
        released_stages()
    );
    let usage = conn.query_row(
        &sql,
        params![
            user_id,
            from.format(DATE_FMT).to_string(),
            to.format(DATE_FMT).to_string(),
        ],
        |row| {
            Ok(Usage {
                bookings: row.get(0)?,
                hours: row.get(1)?,
            })
        },
    )?;
    Ok(usage)
}

// ── Stage History ──

pub fn insert_history(
    conn: &Connection,
    booking_id: &str,
    stage: ApprovalStage,
    changed_by: Option<&str>,
    changed_at: &NaiveDateTime,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO booking_status_history (booking_id, stage, changed_by, changed_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![booking_id, stage.as_str(), changed_by, fmt_datetime(changed_at)],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_history(conn: &Connection, booking_id: &str) -> anyhow::Result<Vec<StageHistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, booking_id, stage, changed_by, changed_at
         FROM booking_status_history WHERE booking_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![booking_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut entries = vec![];
    for row in rows {
        let (id, booking_id, stage, changed_by, changed_at) = row?;
        entries.push(StageHistoryEntry {
            id,
            booking_id,
            stage: ApprovalStage::parse(&stage)
                .with_context(|| format!("unknown approval stage in history: {stage}"))?,
            changed_by,
            changed_at: parse_datetime(&changed_at)?,
        });
    }
    Ok(entries)
}

/// The newest `limit` stage changes after `since_id`, oldest first.
pub fn get_stage_changes_since(
    conn: &Connection,
    since_id: i64,
    limit: i64,
) -> anyhow::Result<Vec<StageChange>> {
    let mut stmt = conn.prepare(
        "SELECT h.id, h.booking_id, b.user_id, o.advisor_id, h.stage, h.changed_by, h.changed_at
         FROM booking_status_history h
         JOIN bookings b ON b.id = h.booking_id
         JOIN users o ON o.id = b.user_id
         WHERE h.id > ?1
         ORDER BY h.id DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![since_id, limit], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, String>(6)?,
        ))
    })?;

    let mut changes = vec![];
    for row in rows {
        let (id, booking_id, owner_id, advisor_id, stage, changed_by, changed_at) = row?;
        changes.push(StageChange {
            id,
            booking_id,
            owner_id,
            advisor_id,
            stage: ApprovalStage::parse(&stage)
                .with_context(|| format!("unknown approval stage in history: {stage}"))?,
            changed_by,
            changed_at: parse_datetime(&changed_at)?,
        });
    }
    changes.reverse();
    Ok(changes)
}
