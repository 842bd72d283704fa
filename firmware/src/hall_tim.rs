//! TIM4ベースのHallセンサー入力
//!
//! STM32のHall Sensor Interface Mode（XORモード）で3つのHall入力のエッジを
//! 検出し、割り込みでHall状態を更新します。速度計算は制御コアが
//! エッジのタイムスタンプから行うため、ここでは状態とエッジ数のみ保持します。
//!
//! ## ハードウェア構成
//! - TIM4_CH1 (PB6): Hall H1
//! - TIM4_CH2 (PB7): Hall H2
//! - TIM4_CH3 (PB8): Hall H3

use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use embassy_stm32::pac;

/// 最後にエッジで取得したHall状態
pub static HALL_STATE: AtomicU8 = AtomicU8::new(0);

/// 検出したエッジ数（デバッグ用）
pub static EDGE_COUNT: AtomicU32 = AtomicU32::new(0);

/// PB6/PB7/PB8をTIM4のAlternate Function (AF2) に設定
///
/// # Safety
/// PACを使用した直接的なレジスタ操作を含むため、unsafe
pub unsafe fn init_hall_gpio() {
    let rcc = pac::RCC;
    let gpiob = pac::GPIOB;

    rcc.ahb2enr().modify(|w| w.set_gpioben(true));

    // 外部プルアップ抵抗があるため内部プルアップ無し
    for pin in 6..=8usize {
        gpiob
            .moder()
            .modify(|w| w.set_moder(pin, pac::gpio::vals::Moder::ALTERNATE));
        gpiob
            .pupdr()
            .modify(|w| w.set_pupdr(pin, pac::gpio::vals::Pupdr::FLOATING));
        gpiob
            .ospeedr()
            .modify(|w| w.set_ospeedr(pin, pac::gpio::vals::Ospeedr::VERY_HIGH_SPEED));
        // PB6/PB7はAFRL、PB8はAFRH[0]
        gpiob.afr(pin / 8).modify(|w| w.set_afr(pin % 8, 2));
    }

    // 初期状態を取得（最初のエッジまで0のままにしない）
    HALL_STATE.store(read_hall_pins(), Ordering::Relaxed);
}

/// TIM4 Hall Sensor Interface の初期化
///
/// # Safety
/// PACを使用した直接的なレジスタ操作を含むため、unsafe
pub unsafe fn init_hall_timer() {
    let rcc = pac::RCC;
    let tim4 = pac::TIM4;

    rcc.apb1enr1().modify(|w| w.set_tim4en(true));

    tim4.cr1().modify(|w| w.set_cen(false));
    tim4.psc().write_value(0);
    tim4.arr().write_value(pac::timer::regs::ArrCore(0xFFFF));

    // CR2.TI1S = XOR: 3つのHall入力をXORしてTI1へ
    tim4.cr2().modify(|w| w.set_ti1s(pac::timer::vals::Ti1s::XOR));

    // TI1のエッジ検出をトリガーにしてカウンターをリセット
    tim4.smcr().modify(|w| {
        w.set_ts(pac::timer::vals::Ts::TI1F_ED);
        w.set_sms(pac::timer::vals::Sms::RESET_MODE);
    });

    // IC1 = TRC、8サイクルフィルタ
    tim4.ccmr_input(0).modify(|w| {
        w.set_ccs(0, pac::timer::vals::CcmrInputCcs::TRC);
        w.set_icf(0, pac::timer::vals::FilterValue::FCK_INT_N8);
    });
    tim4.ccer().modify(|w| {
        w.set_cce(0, true);
        w.set_ccp(0, false);
    });

    // キャプチャ割り込みのみ（タイムアウトは制御コアのストール判定で扱う）
    tim4.dier().modify(|w| w.set_ccie(0, true));

    // 優先度2 (0x20): Embassyタスクより高優先度
    cortex_m::peripheral::NVIC::unmask(pac::Interrupt::TIM4);
    let mut cp = cortex_m::Peripherals::steal();
    cp.NVIC.set_priority(pac::Interrupt::TIM4, 0x20);

    tim4.cnt().write_value(pac::timer::regs::CntCore(0));
    tim4.sr().write(|w| w.0 = 0);
    tim4.egr().write(|w| w.set_ug(true));
    tim4.cr1().modify(|w| w.set_cen(true));
}

/// GPIOからHall状態 (H3:H2:H1) を直接読み取り
#[inline(always)]
pub fn read_hall_pins() -> u8 {
    let idr = pac::GPIOB.idr().read();
    let h1 = idr.idr(6) as u8;
    let h2 = idr.idr(7) as u8;
    let h3 = idr.idr(8) as u8;
    (h3 << 2) | (h2 << 1) | h1
}

/// TIM4割り込みハンドラー（Capture/Compare 1）
///
/// # Safety
/// 割り込みコンテキストで実行されるため、処理は最小限にする
#[inline(always)]
pub unsafe fn tim4_irq_handler() {
    let tim4 = pac::TIM4;
    let sr = tim4.sr().read();

    if sr.ccif(0) {
        tim4.sr().modify(|w| w.set_ccif(0, false));
        HALL_STATE.store(read_hall_pins(), Ordering::Relaxed);
        EDGE_COUNT.fetch_add(1, Ordering::Relaxed);
    }
    if sr.uif() {
        tim4.sr().modify(|w| w.set_uif(false));
    }
}

/// TIM4割り込みのRust側エントリーポイント
#[allow(non_snake_case)]
#[no_mangle]
pub unsafe extern "C" fn TIM4() {
    tim4_irq_handler();
}

/// Hall状態を取得（TIM4割り込みでキャプチャされた値）
#[inline(always)]
pub fn get_hall_state() -> u8 {
    HALL_STATE.load(Ordering::Relaxed)
}

/// 起動からのHallエッジ数
pub fn edge_count() -> u32 {
    EDGE_COUNT.load(Ordering::Relaxed)
}
