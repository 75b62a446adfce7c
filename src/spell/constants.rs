//! Cast Engine Constants
//!
//! Centralized location for magic numbers used throughout the cast engine.
//! This makes it easier to tune behavior and ensures consistency.

// ============================================================================
// Global Cooldown
// ============================================================================

/// Standard global cooldown duration in milliseconds.
pub const GCD_MS: u64 = 1500;

// ============================================================================
// Travel Time
// ============================================================================

/// Minimum distance used when deriving a missile travel delay. A target on
/// top of the caster still waits out this much flight, never zero.
pub const MISSILE_MIN_DISTANCE: f32 = 5.0;

// ============================================================================
// Range Checks
// ============================================================================

/// Flat leeway added to a spell's max range when re-checking at execute time.
/// Absorbs movement that happened during the cast-time delay.
pub const RANGE_CHECK_LEEWAY: f32 = 5.0;

/// Multiplier on max range while a channel is running; channel continuity is
/// more forgiving than the initial cast check.
pub const CHANNEL_RANGE_PAD: f32 = 1.25;

// ============================================================================
// Chain Targeting
// ============================================================================

/// Jump radius between chain targets for melee-school spells.
pub const CHAIN_JUMP_RADIUS_MELEE: f32 = 8.0;

/// Jump radius for ranged physical spells.
pub const CHAIN_JUMP_RADIUS_RANGED: f32 = 10.0;

/// Jump radius for magic spells.
pub const CHAIN_JUMP_RADIUS_MAGIC: f32 = 12.5;

/// Forward arc (radians, total width) a chain candidate must fall inside
/// unless the spell is flagged as far-jumping.
pub const CHAIN_FORWARD_ARC: f32 = std::f32::consts::PI;

// ============================================================================
// Trajectory
// ============================================================================

/// Half-width of the corridor a trajectory spell sweeps for targets.
pub const TRAJECTORY_WIDTH: f32 = 2.0;

/// Vertical tolerance between the arc height and a candidate before the arc
/// is considered to have passed over or under it.
pub const TRAJECTORY_HEIGHT_TOLERANCE: f32 = 2.5;

/// Tangent values are clamped here to avoid numeric blow-up as the launch
/// elevation approaches vertical.
pub const TRAJECTORY_MAX_TANGENT: f32 = 100_000.0;

// ============================================================================
// Diminishing Returns
// ============================================================================

/// Window with no fresh application after which a diminishing-returns level
/// decays back to full effect.
pub const DIMINISHING_RESET_MS: u64 = 15_000;

// ============================================================================
// Scheduling
// ============================================================================

/// Upper bound on the simulated time one tick may advance. Keeps a stalled
/// host from teleporting the simulation forward.
pub const MAX_TICK_DELTA_MS: u64 = 500;

/// Re-entry offset for channel revalidation ticks.
pub const CHANNEL_UPDATE_INTERVAL_MS: u64 = 250;

/// Delay before a reflect proc notification fires, keeping it strictly after
/// the reflecting hit's own tick.
pub const REFLECT_PROC_DELAY_MS: u64 = 1;

/// Grace window during which a departed unit can still be found by effects
/// flagged as usable on departed targets.
pub const DEPARTED_GRACE_MS: u64 = 10_000;

// ============================================================================
// Gathering
// ============================================================================

/// Skill margin over the lock requirement at which gathering stops being
/// able to fail. Below it, failure chance ramps linearly.
pub const GATHER_SAFE_SKILL_MARGIN: u32 = 25;
