#![deny(unsafe_code)]
#![no_main]
#![no_std]

use defmt_rtt as _; // global logger
use panic_probe as _;
use rtic::app;
use rtic_monotonics::stm32::prelude::*;
use tracker_core::WakeArbiter;

mod device_id;
mod eth;
mod network;
mod power;
mod sensor;
mod time;
mod tls_buffers;

stm32_tim2_monotonic!(Mono, 1_000_000);

/// Latched by the motion interrupt, consumed by the scheduler
static ARBITER: WakeArbiter = WakeArbiter::new();

#[app(device = embassy_stm32, peripherals = true, dispatchers = [USART1, USART2, USART3])]
mod app {
    use super::*;
    use defmt::{error, info};
    use embassy_embedded_hal::shared_bus::asynch::i2c::I2cDevice;
    use embassy_futures::join::join3;
    use embassy_stm32::exti::ExtiInput;
    use embassy_stm32::gpio::{Level, Output, Pull, Speed};
    use embassy_stm32::i2c::{self, I2c};
    use embassy_stm32::mode::Async;
    use embassy_stm32::peripherals;
    use embassy_stm32::rcc::{Hse, HseMode, LsConfig, LseConfig, LseMode};
    use embassy_stm32::rng::Rng;
    use embassy_stm32::rtc::{Rtc, RtcConfig};
    use embassy_stm32::spi::{self, Spi};
    use embassy_stm32::time::Hertz;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_sync::mutex::Mutex;
    use static_cell::StaticCell;
    use tracker_core::{Devices, Scheduler, TrackerConfig};

    use network::{manager, MqttConfig, MqttUplink, NetworkConfig, SntpConfig, SntpTimeSource};
    use sensor::{Lsm6dsox, SensorConfig, MLC_PROGRAM};

    type Peri<T> = embassy_stm32::Peri<'static, T>;
    type I2cBus = Mutex<CriticalSectionRawMutex, I2c<'static, Async>>;

    struct NetworkPeripherals {
        spi: Peri<peripherals::SPI2>,
        sck: Peri<peripherals::PB13>,
        mosi: Peri<peripherals::PB15>,
        miso: Peri<peripherals::PB14>,
        cs: Peri<peripherals::PC6>,
        reset: Peri<peripherals::PC3>,
        int: Peri<peripherals::PC2>,
        exti: Peri<peripherals::EXTI2>,
        dma_tx: Peri<peripherals::DMA1_CH4>,
        dma_rx: Peri<peripherals::DMA1_CH3>,
        rng: Peri<peripherals::RNG>,
    }

    struct SensorPeripherals {
        i2c: Peri<peripherals::I2C1>,
        scl: Peri<peripherals::PB6>,
        sda: Peri<peripherals::PB7>,
        dma_tx: Peri<peripherals::DMA1_CH6>,
        dma_rx: Peri<peripherals::DMA1_CH0>,
    }

    embassy_stm32::bind_interrupts!(struct Irqs {
        RNG => embassy_stm32::rng::InterruptHandler<peripherals::RNG>;
        I2C1_EV => i2c::EventInterruptHandler<peripherals::I2C1>;
        I2C1_ER => i2c::ErrorInterruptHandler<peripherals::I2C1>;
    });

    #[shared]
    struct Shared {}

    #[local]
    struct Local {}

    #[init]
    fn init(_cx: init::Context) -> (Shared, Local) {
        info!("Motion tracker starting...");

        // Adafruit Feather STM32F405: 12 MHz HSE, 32.768 kHz LSE (PC14/PC15)
        let mut config = embassy_stm32::Config::default();
        config.rcc.hse = Some(Hse {
            freq: Hertz(12_000_000),
            mode: HseMode::Oscillator,
        });

        // 12 MHz / 6 * 168 = 336 MHz VCO; /4 = 84 MHz SYSCLK, /7 = 48 MHz for RNG
        config.rcc.pll_src = embassy_stm32::rcc::PllSource::HSE;
        config.rcc.pll = Some(embassy_stm32::rcc::Pll {
            prediv: embassy_stm32::rcc::PllPreDiv::DIV6,
            mul: embassy_stm32::rcc::PllMul::MUL168,
            divp: Some(embassy_stm32::rcc::PllPDiv::DIV4),
            divq: Some(embassy_stm32::rcc::PllQDiv::DIV7),
            divr: None,
        });
        config.rcc.sys = embassy_stm32::rcc::Sysclk::PLL1_P;
        config.rcc.ahb_pre = embassy_stm32::rcc::AHBPrescaler::DIV1; // 84 MHz
        config.rcc.apb1_pre = embassy_stm32::rcc::APBPrescaler::DIV2; // 42 MHz
        config.rcc.apb2_pre = embassy_stm32::rcc::APBPrescaler::DIV1; // 84 MHz

        config.rcc.ls = LsConfig {
            rtc: embassy_stm32::rcc::RtcClockSource::LSE,
            lsi: false,
            lse: Some(LseConfig {
                frequency: Hertz(32_768),
                mode: LseMode::Oscillator(embassy_stm32::rcc::LseDrive::MediumHigh),
            }),
        };

        let p = embassy_stm32::init(config);

        // TIM2 on APB1 runs at 2 * 42 MHz
        Mono::start(84_000_000);

        time::initialize_rtc(Rtc::new(p.RTC, RtcConfig::default()));

        // LSM6DSOX on the Feather's STEMMA QT I2C (PB6 SCL, PB7 SDA), INT1 on PB8
        let sensor_periph = SensorPeripherals {
            i2c: p.I2C1,
            scl: p.PB6,
            sda: p.PB7,
            dma_tx: p.DMA1_CH6,
            dma_rx: p.DMA1_CH0,
        };

        let net_periph = NetworkPeripherals {
            spi: p.SPI2,
            sck: p.PB13,
            mosi: p.PB15,
            miso: p.PB14,
            cs: p.PC6,
            reset: p.PC3,
            int: p.PC2,
            exti: p.EXTI2,
            dma_tx: p.DMA1_CH4,
            dma_rx: p.DMA1_CH3,
            rng: p.RNG,
        };

        motion_watch::spawn(p.PB8, p.EXTI8).ok();
        tracker_task::spawn(net_periph, sensor_periph).ok();

        (Shared {}, Local {})
    }

    /// Forward LSM6DSOX INT1 rising edges to the wake arbiter
    #[task(priority = 2)]
    async fn motion_watch(
        _cx: motion_watch::Context,
        pin: Peri<peripherals::PB8>,
        exti: Peri<peripherals::EXTI8>,
    ) -> ! {
        let mut int1 = ExtiInput::new(pin, exti, Pull::Down);
        loop {
            int1.wait_for_rising_edge().await;
            ARBITER.signal();
            power::WAKE_EDGE.signal(());
        }
    }

    /// Network stack plus the scheduler
    ///
    /// Stack is !Send and must remain within this task.
    #[task(priority = 1)]
    async fn tracker_task(
        _cx: tracker_task::Context,
        periph: NetworkPeripherals,
        sensor_periph: SensorPeripherals,
    ) -> ! {
        use embassy_net::{Config, StackResources};

        let mut i2c_config = i2c::Config::default();
        i2c_config.frequency = Hertz(400_000);
        let i2c = I2c::new(
            sensor_periph.i2c,
            sensor_periph.scl,
            sensor_periph.sda,
            Irqs,
            sensor_periph.dma_tx,
            sensor_periph.dma_rx,
            i2c_config,
        );
        static I2C_BUS: StaticCell<I2cBus> = StaticCell::new();
        let i2c_bus: &'static I2cBus = I2C_BUS.init(Mutex::new(i2c));

        let mut spi_config = spi::Config::default();
        spi_config.frequency = Hertz(10_000_000); // W5500 tolerates up to 80 MHz

        let spi = Spi::new(
            periph.spi,
            periph.sck,
            periph.mosi,
            periph.miso,
            periph.dma_tx,
            periph.dma_rx,
            spi_config,
        );
        let eth_periph = eth::EthPeripherals {
            spi,
            cs: Output::new(periph.cs, Level::High, Speed::VeryHigh),
            reset: Output::new(periph.reset, Level::High, Speed::Low),
            int: ExtiInput::new(periph.int, periph.exti, Pull::Up),
        };

        let net_config = NetworkConfig::default();
        let (device, mut w5500_runner) =
            match eth::init_w5500(eth_periph, net_config.mac_addr).await {
                Ok(parts) => parts,
                Err(e) => {
                    error!("Ethernet unavailable, tracker halted: {:?}", e);
                    return park().await;
                }
            };

        static RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
        let (stack, mut net_runner) = embassy_net::new(
            device,
            Config::dhcpv4(Default::default()),
            RESOURCES.init(StackResources::new()),
            net_config.seed,
        );

        let app_logic = async {
            let mut classifier = Lsm6dsox::new(I2cDevice::new(i2c_bus), SensorConfig::default());
            if let Err(e) = classifier.configure(MLC_PROGRAM).await {
                // Reads keep failing and count as "no change"
                error!("LSM6DSOX setup failed: {:?}", e);
            }
            let accelerometer = Lsm6dsox::new(I2cDevice::new(i2c_bus), SensorConfig::default());

            manager::wait_for_config(stack).await;

            let rng = Rng::new(periph.rng, Irqs);
            let uplink = match MqttUplink::new(stack, rng, MqttConfig::default()) {
                Ok(uplink) => uplink,
                Err(e) => {
                    error!("MQTT uplink unavailable, tracker halted: {:?}", e);
                    return park().await;
                }
            };

            let devices = Devices {
                clock: time::BoardRtc,
                time_source: SntpTimeSource::new(stack, SntpConfig::default()),
                sleeper: power::MonoSleep,
                classifier,
                accelerometer,
                delay: embassy_time::Delay,
                uplink,
            };
            match Scheduler::new(TrackerConfig::default(), &ARBITER, devices) {
                Ok(mut scheduler) => scheduler.run().await,
                Err(e) => {
                    error!("Invalid tracker configuration: {:?}", e);
                    park().await
                }
            }
        };

        join3(w5500_runner.run(), net_runner.run(), app_logic).await;
        park().await
    }

    /// Give up the task for good; idle keeps the core in WFI
    async fn park() -> ! {
        loop {
            Mono::delay(60.minutes()).await;
        }
    }

    #[idle]
    fn idle(_cx: idle::Context) -> ! {
        info!("Idle task started - entering WFI loop");
        loop {
            cortex_m::asm::wfi();
        }
    }
}
